#![no_main]

use libfuzzer_sys::fuzz_target;
use posemirror::index::decode_tree;
use posemirror::{Gallery, MetricKind, PoseRecord};

fuzz_target!(|data: &[u8]| {
    // First byte picks the size of the gallery the tree is checked against.
    let Some((&size, bytes)) = data.split_first() else {
        return;
    };
    let records = (0..size as usize)
        .map(|i| {
            let x = i as f32 / 256.0;
            let c = (i % 5) as f32 * 0.25;
            PoseRecord::new(format!("r{}", i), vec![x, 1.0 - x], vec![c])
        })
        .collect();
    let Ok(gallery) = Gallery::new(records, 1) else {
        return;
    };

    for metric in [MetricKind::Weighted, MetricKind::Cosine] {
        if let Ok(tree) = decode_tree(bytes, &gallery, metric) {
            assert_eq!(tree.len(), gallery.len());
            assert!(tree.depth() <= tree.len());
        }
    }
});
