pub mod committer;

pub use committer::{Commit, CommitConfig, CommitError, Committer};
