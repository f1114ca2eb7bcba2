//! Integration tests exercising the Firebase client and the full resolution pipeline against
//! a mocked Identity Toolkit.

mod firebase;
mod pipeline;
mod support;
