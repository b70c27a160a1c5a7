#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Authorization for Navarch
//!
//! Two distinct Kubernetes subsystems, kept as separate components: token
//! review answers "who is this bearer?", access review answers "may the
//! calling identity do X?". Conflating them in one cache would be a bug.

mod access;
mod error;
mod token_review;

pub use access::{AccessReviewer, ReviewClient, SelfSubjectReviewClient, Verdict};
pub use error::AuthError;
pub use token_review::{ReviewedUser, TokenReviewer};
