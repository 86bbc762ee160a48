//! Randomized checks of the region and collapse-state invariants.

use editor_folding::collector::RankedRange;
use editor_folding::provider::compute_indent_ranges;
use editor_folding::{
    FoldingLimitReporter, FoldingModel, FoldingRangeInfo, FoldingRegions, HiddenRangeModel,
    TextSnapshot, sanitize_ranges,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROUNDS: usize = 200;

fn random_document(rng: &mut StdRng) -> String {
    let line_count = rng.gen_range(1..80);
    let mut text = String::new();
    let mut depth: usize = 0;
    for i in 0..line_count {
        if rng.gen_bool(0.1) {
            text.push('\n');
            continue;
        }
        depth = match rng.gen_range(0..3) {
            0 => depth.saturating_sub(rng.gen_range(1..3)),
            1 => depth,
            _ => (depth + 1).min(6),
        };
        text.push_str(&"  ".repeat(depth));
        text.push_str(&format!("line {i}\n"));
    }
    text
}

fn assert_well_nested(regions: &FoldingRegions) {
    for i in 0..regions.len() {
        assert!(regions.start_line(i) < regions.end_line(i));
        if i > 0 {
            assert!(regions.start_line(i - 1) < regions.start_line(i));
        }
        match regions.parent_index(i) {
            Some(parent) => {
                assert!(parent < i);
                assert!(regions.start_line(parent) < regions.start_line(i));
                assert!(regions.end_line(i) <= regions.end_line(parent));
                assert_eq!(regions.level(i), regions.level(parent) + 1);
            }
            None => assert_eq!(regions.level(i), 1),
        }
        // Regions that are not ancestors never overlap.
        for j in 0..i {
            let nested = regions.contained_by(i, j);
            let disjoint = regions.end_line(j) < regions.start_line(i);
            assert!(nested || disjoint, "regions {j} and {i} overlap");
        }
    }
}

fn indent_regions(text: &str) -> (TextSnapshot, FoldingRegions) {
    let snapshot = TextSnapshot::from_text(text);
    let regions = compute_indent_ranges(&snapshot, false, None, 4, FoldingLimitReporter::new(5000));
    (snapshot, regions)
}

#[test]
fn test_indent_regions_are_well_nested() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..ROUNDS {
        let text = random_document(&mut rng);
        let (snapshot, regions) = indent_regions(&text);
        assert_well_nested(&regions);
        if let Some(last) = regions.len().checked_sub(1) {
            assert!(regions.end_line(last) < snapshot.line_count());
        }
    }
}

#[test]
fn test_sanitized_supplier_ranges_are_well_nested() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..ROUNDS {
        let count = rng.gen_range(0..40);
        let ranges: Vec<RankedRange> = (0..count)
            .map(|_| {
                let start = rng.gen_range(0..100);
                let end = start + rng.gen_range(0..20);
                RankedRange {
                    range: FoldingRangeInfo::new(start, end),
                    rank: rng.gen_range(0..3),
                }
            })
            .collect();
        let regions = sanitize_ranges(ranges, FoldingLimitReporter::new(5000));
        assert_well_nested(&regions);
    }
}

#[test]
fn test_cursor_lines_are_never_hidden() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..ROUNDS {
        let text = random_document(&mut rng);
        let (snapshot, regions) = indent_regions(&text);
        let line_count = snapshot.line_count();
        let mut model = FoldingModel::new(snapshot);
        model.update(regions, &[]);

        let targets: Vec<(usize, bool)> = (0..model.regions().len())
            .map(|i| (i, rng.gen_bool(0.5)))
            .collect();
        model.set_collapse_state(&targets);

        let cursors: Vec<usize> = (0..rng.gen_range(1..4))
            .map(|_| rng.gen_range(0..line_count))
            .collect();
        model.expand_regions_hiding_lines(&cursors);

        let mut hidden = HiddenRangeModel::new();
        hidden.update_from(model.regions());
        for line in cursors {
            assert!(!hidden.is_hidden(line), "cursor line {line} is hidden");
        }
    }
}

#[test]
fn test_recompute_keeps_collapse_state_outside_cursors() {
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..ROUNDS {
        let text = random_document(&mut rng);
        let (snapshot, regions) = indent_regions(&text);
        let mut model = FoldingModel::new(snapshot);
        model.update(regions.clone(), &[]);
        let targets: Vec<(usize, bool)> = (0..regions.len())
            .map(|i| (i, rng.gen_bool(0.5)))
            .collect();
        model.set_collapse_state(&targets);
        let before = model.regions().clone();

        let cursor = rng.gen_range(0..model.line_count());
        model.update(regions, &[cursor]);
        for i in 0..before.len() {
            let hides_cursor = before.start_line(i) < cursor && cursor <= before.end_line(i);
            let expected = before.is_collapsed(i) && !hides_cursor;
            assert_eq!(model.regions().is_collapsed(i), expected);
        }
    }
}

#[test]
fn test_memento_restores_collapse_state() {
    let mut rng = StdRng::seed_from_u64(47);
    for _ in 0..ROUNDS {
        let text = random_document(&mut rng);
        let (snapshot, regions) = indent_regions(&text);
        let mut model = FoldingModel::new(snapshot.clone());
        model.update(regions.clone(), &[]);
        let targets: Vec<(usize, bool)> = (0..regions.len())
            .map(|i| (i, rng.gen_bool(0.3)))
            .collect();
        model.set_collapse_state(&targets);
        let memento = model.memento();

        let mut restored = FoldingModel::new(snapshot);
        restored.update(regions, &[]);
        assert_eq!(restored.apply_memento(&memento), !memento.is_empty());
        assert_eq!(restored.regions(), model.regions());
    }
}
