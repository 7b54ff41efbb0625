#![no_main]

use libfuzzer_sys::fuzz_target;
use posemirror::index::{linear_scan, search};
use posemirror::{Gallery, MetricKind, PoseRecord, PoseView, VpTree};

const JOINTS: usize = 2;

fn to_unit(b: u8) -> f32 {
    b as f32 / 255.0
}

fuzz_target!(|data: &[u8]| {
    // Each 6-byte chunk is one record: 4 coordinates, 2 confidences.
    let chunks: Vec<&[u8]> = data.chunks_exact(6).collect();
    let Some((query, rest)) = chunks.split_first() else {
        return;
    };
    let records: Vec<PoseRecord> = rest
        .iter()
        .enumerate()
        .map(|(i, c)| {
            PoseRecord::new(
                format!("r{}", i),
                c[..4].iter().copied().map(to_unit).collect(),
                c[4..].iter().copied().map(to_unit).collect(),
            )
        })
        .collect();
    let Ok(gallery) = Gallery::new(records, JOINTS) else {
        return;
    };
    if gallery.is_empty() {
        return;
    }

    let coordinates: Vec<f32> = query[..4].iter().copied().map(to_unit).collect();
    let confidence: Vec<f32> = query[4..].iter().copied().map(to_unit).collect();
    let view = PoseView::new(&coordinates, &confidence);
    let k = (query[0] as usize % 8) + 1;

    for kind in [MetricKind::Weighted, MetricKind::Cosine] {
        let metric = kind.metric();
        let tree = VpTree::build(&gallery, metric).unwrap();
        let fast = search(&tree, &gallery, metric, view, k).unwrap();
        let slow = linear_scan(&gallery, metric, view, k).unwrap();
        assert_eq!(fast, slow, "{}", kind);
    }
});
