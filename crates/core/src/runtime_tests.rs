// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::arb_runtime_spec;
use proptest::prelude::*;

#[test]
fn hash_is_stable_for_identical_specs() {
    let a = RuntimeSpec {
        python_version: "3.12".into(),
        requirements: ["requests==2.32.0", "lxml"].iter().map(|s| s.to_string()).collect(),
        constraints: vec!["urllib3<3".into()],
        env_vars: BTreeMap::new(),
    };
    let b = a.clone();
    assert_eq!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn hash_ignores_env_vars() {
    let mut a = RuntimeSpec::new("3.12");
    a.requirements.insert("requests".into());
    let mut b = a.clone();
    b.env_vars.insert("HTTP_PROXY".into(), "http://proxy:8080".into());
    assert_eq!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn hash_differs_on_python_version() {
    let a = RuntimeSpec::new("3.11");
    let b = RuntimeSpec::new("3.12");
    assert_ne!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn hash_differs_on_requirements() {
    let mut a = RuntimeSpec::new("3.12");
    a.requirements.insert("requests".into());
    let mut b = RuntimeSpec::new("3.12");
    b.requirements.insert("httpx".into());
    assert_ne!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn hash_is_permutation_invariant_over_requirements() {
    let a = crate::test_support::runtime_spec("3.12", &["zlib", "requests", "lxml"]);
    let b = crate::test_support::runtime_spec("3.12", &["lxml", "zlib", "requests"]);
    assert_eq!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn field_boundaries_are_unambiguous() {
    // ["ab"] vs ["a", "b"] must not collide.
    let mut a = RuntimeSpec::new("3.12");
    a.requirements.insert("ab".into());
    let mut b = RuntimeSpec::new("3.12");
    b.requirements.insert("a".into());
    b.requirements.insert("b".into());
    assert_ne!(a.runtime_hash(), b.runtime_hash());
}

#[test]
fn hash_is_hex_sha256() {
    let hash = RuntimeSpec::new("3.12").runtime_hash();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn bin_dir_is_platform_shaped() {
    let handle = RuntimeHandle {
        path: PathBuf::from("/data/runtimes/abc"),
        runtime_hash: "abc".into(),
        python_executable: PathBuf::from("/data/runtimes/abc/bin/python"),
    };
    let bin = handle.bin_dir();
    if cfg!(windows) {
        assert!(bin.ends_with("Scripts"));
    } else {
        assert!(bin.ends_with("bin"));
    }
}

proptest! {
    /// Requirement insertion order never changes the hash (BTreeSet sorts),
    /// and env_vars never participate.
    #[test]
    fn hash_invariant_under_env_vars(spec in arb_runtime_spec()) {
        let mut stripped = spec.clone();
        stripped.env_vars.clear();
        prop_assert_eq!(spec.runtime_hash(), stripped.runtime_hash());
    }

    /// Specs serialized and deserialized hash identically.
    #[test]
    fn hash_survives_serde(spec in arb_runtime_spec()) {
        let json = serde_json::to_string(&spec).unwrap();
        let back: RuntimeSpec = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(spec.runtime_hash(), back.runtime_hash());
    }
}
