//! Property-based tests for quantstage
//!
//! These tests verify:
//! - Composition never mutates the manifest
//! - Distinct channels never share a save path
//! - Missing-input reports keep input order

use proptest::prelude::*;
use quantstage::composer::{channel_save_path, compose, ResolvedInputs};
use quantstage::inputs::missing_inputs;
use quantstage::{DefaultConfig, ProcessingManifest};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

fn channel_strategy() -> impl Strategy<Value = String> {
    "Ex_[0-9]{3}_Em_[0-9]{3}"
}

fn manifest(channel: &str, save_root: &str, scale: u32) -> ProcessingManifest {
    match json!({
        "quantification": {
            "fused_folder": "../data/fused",
            "channel": channel,
            "save_path": save_root
        },
        "stitching": {"s3_path": "s3://aind-open-data/SmartSPIM_000_stitched"},
        "registration": {"input_scale": scale}
    }) {
        Value::Object(map) => ProcessingManifest::new(map),
        _ => unreachable!(),
    }
}

fn inputs(channel: &str) -> ResolvedInputs {
    ResolvedInputs {
        dataset_name: "SmartSPIM_000_stitched".to_string(),
        ccf_registration_folder: PathBuf::from("../data/ccf_Ex_639_Em_667"),
        cell_segmentation_folder: PathBuf::from(format!("../data/cell_{}", channel)),
    }
}

proptest! {
    /// The manifest is identical before and after composition
    #[test]
    fn compose_leaves_manifest_untouched(
        channel in channel_strategy(),
        save_root in "[a-z]{1,8}(/[a-z]{1,8}){0,3}",
        scale in 0u32..6,
    ) {
        let manifest = manifest(&channel, &save_root, scale);
        let before = manifest.clone();
        let config = compose(
            &manifest,
            DefaultConfig::embedded().unwrap(),
            &inputs(&channel),
            Path::new("/capsule/code"),
        ).unwrap();
        prop_assert_eq!(&manifest, &before);
        prop_assert_eq!(config.get("input_params.downsample_res"), Some(&json!(scale)));
    }

    /// save_path is {save_root}/quant_{channel}, absolute
    #[test]
    fn save_path_is_per_channel(channel in channel_strategy()) {
        let config = compose(
            &manifest(&channel, "/capsule/results", 3),
            DefaultConfig::new(Map::new()),
            &inputs(&channel),
            Path::new("/"),
        ).unwrap();
        prop_assert_eq!(config.save_path(), format!("/capsule/results/quant_{}", channel));
    }

    /// Two different channels never collide under the same save root
    #[test]
    fn distinct_channels_never_share_save_path(
        a in channel_strategy(),
        b in channel_strategy(),
        save_root in "(\\.\\./)?[a-z]{1,8}",
    ) {
        prop_assume!(a != b);
        let base = Path::new("/capsule/code");
        prop_assert_ne!(
            channel_save_path(&save_root, &a, base),
            channel_save_path(&save_root, &b, base)
        );
    }

    /// Only missing paths are reported, in their original order
    #[test]
    fn missing_inputs_preserve_order(present in proptest::collection::vec(any::<bool>(), 0..12)) {
        let dir = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = present
            .iter()
            .enumerate()
            .map(|(i, exists)| {
                let path = dir.path().join(format!("input_{}", i));
                if *exists {
                    fs::write(&path, "").unwrap();
                }
                path
            })
            .collect();

        let expected: Vec<String> = paths
            .iter()
            .zip(&present)
            .filter(|(_, exists)| !**exists)
            .map(|(path, _)| path.display().to_string())
            .collect();
        prop_assert_eq!(missing_inputs(&paths), expected);
    }
}
