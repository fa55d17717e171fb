//! TOML hydration corpus shared by the runtime crates' integration tests.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::notation::{TreeSpec, parse_tree};

pub const HYDRATE_CORPUS_FORMAT_V1: &str = "hydrate-corpus-v1";

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Active,
    Skip,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCase {
    id: String,
    before: String,
    after: String,
    ops: Option<Vec<String>>,
    #[serde(default = "default_status")]
    status: CaseStatus,
    reason: Option<String>,
}

fn default_status() -> CaseStatus {
    CaseStatus::Active
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCorpus {
    format: String,
    cases: Vec<RawCase>,
}

/// One hydration case: the main-thread tree as first rendered, the
/// background tree as rendered afterwards, and optionally the exact patch
/// expected between them, one `SnapshotOperation` display line per entry.
#[derive(Clone, Debug)]
pub struct HydrateCase {
    pub id: String,
    pub before: TreeSpec,
    pub after: TreeSpec,
    pub ops: Option<Vec<String>>,
    pub status: CaseStatus,
    pub reason: Option<String>,
}

/// Path of a corpus file shipped with this crate.
pub fn corpus_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("corpus").join(name)
}

pub fn load_hydrate_corpus(path: &Path) -> Vec<HydrateCase> {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read hydrate corpus {path:?}: {err}"));
    let raw: RawCorpus = toml::from_str(&content)
        .unwrap_or_else(|err| panic!("failed to parse hydrate corpus {path:?}: {err}"));
    assert_eq!(
        raw.format, HYDRATE_CORPUS_FORMAT_V1,
        "unsupported format in {path:?}"
    );
    assert!(!raw.cases.is_empty(), "hydrate corpus {path:?} has no cases");

    let mut seen = BTreeSet::new();
    raw.cases
        .into_iter()
        .map(|case| {
            assert!(
                seen.insert(case.id.clone()),
                "duplicate case id '{}' in {path:?}",
                case.id
            );
            match case.status {
                CaseStatus::Active => assert!(
                    case.reason.is_none(),
                    "case '{}' has a reason but is active in {path:?}",
                    case.id
                ),
                CaseStatus::Skip => assert!(
                    !case.reason.as_deref().unwrap_or("").is_empty(),
                    "skipped case '{}' is missing a reason in {path:?}",
                    case.id
                ),
            }
            let parse = |label: &str, src: &str| {
                parse_tree(src).unwrap_or_else(|err| {
                    panic!("bad {label} tree for '{}' in {path:?}: {err}", case.id)
                })
            };
            HydrateCase {
                before: parse("before", &case.before),
                after: parse("after", &case.after),
                id: case.id,
                ops: case.ops,
                status: case.status,
                reason: case.reason,
            }
        })
        .collect()
}

/// Active cases, optionally narrowed by the `HYDRATE_CASE` environment
/// variable to ids containing its value.
pub fn active_cases(cases: Vec<HydrateCase>) -> Vec<HydrateCase> {
    let filter = std::env::var("HYDRATE_CASE").ok().filter(|f| !f.is_empty());
    cases
        .into_iter()
        .filter(|case| case.status == CaseStatus::Active)
        .filter(|case| filter.as_deref().is_none_or(|f| case.id.contains(f)))
        .collect()
}
