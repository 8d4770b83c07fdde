use std::sync::Arc;

use dynamo_vision::core_modules::region_identifier::RegionStrategy;
use dynamo_vision::error::EmbedError;
use dynamo_vision::{
    BoundingBox, Embedder, FrameInput, MatchStrategy, PipelineConfig, RawElement, RegionPipeline,
    SelectionResult,
};
use image::{DynamicImage, Rgb, RgbImage};

/// Every patch looks the same, so identity comes down to proximity alone.
struct ConstantEmbedder;

impl Embedder for ConstantEmbedder {
    fn embed(&self, _patch: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![0.5, 0.5, 0.5, 0.5])
    }
}

fn pipeline(config: PipelineConfig) -> RegionPipeline {
    RegionPipeline::new(config, Arc::new(ConstantEmbedder)).unwrap()
}

fn frame(elements: Vec<RawElement>) -> FrameInput {
    FrameInput::from_image(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([240, 240, 240]))),
        elements,
    )
}

/// One menu element per frame, given in pixels on a 100x100 capture.
fn menu_frames(contents: &[&str]) -> Vec<FrameInput> {
    contents
        .iter()
        .map(|text| frame(vec![RawElement::new(1, [10.0, 10.0, 30.0, 30.0], Some(*text))]))
        .collect()
}

#[test]
fn static_menu_falls_back_to_its_surroundings() {
    let report = pipeline(PipelineConfig::default()).analyze_detailed(&menu_frames(&["Menu", "Menu"]));

    assert_eq!(report.track_count, 1);
    assert_eq!(report.static_count, 1);
    assert_eq!(report.dynamic_count, 0);
    assert_eq!(report.strategy, Some(RegionStrategy::Fallback));
    assert_eq!(report.candidates.len(), 4);

    let selection = report.selection;
    assert_eq!(selection.largest_area, Some(BoundingBox::new(0.0, 0.3, 1.0, 1.0)));
    // No element center lies in any surrounding piece, so the first one wins.
    assert_eq!(selection.most_elements, Some(BoundingBox::new(0.0, 0.0, 1.0, 0.1)));
    // No text outside the menu at all.
    assert_eq!(selection.highest_variation, None);
}

#[test]
fn alternating_content_is_dynamic() {
    let report = pipeline(PipelineConfig::default()).analyze_detailed(&menu_frames(&["A", "B", "A"]));

    assert_eq!(report.track_count, 1);
    assert_eq!(report.dynamic_count, 1);
    assert_eq!(report.strategy, Some(RegionStrategy::Heatmap));
    assert_eq!(report.candidates.len(), 1);

    let bbox = report.selection.largest_area.unwrap();
    assert!(bbox.x1 <= 0.1 && bbox.y1 <= 0.1 && bbox.x2 >= 0.3 && bbox.y2 >= 0.3);
    assert_eq!(report.selection, SelectionResult::uniform(bbox));
}

#[test]
fn alternating_content_under_a_high_threshold_is_static() {
    // Normalized entropy of a 2/3 vs 1/3 split is about 0.918.
    let config = PipelineConfig {
        dynamic_threshold: 0.95,
        ..PipelineConfig::default()
    };
    let report = pipeline(config).analyze_detailed(&menu_frames(&["A", "B", "A"]));
    assert_eq!(report.static_count, 1);
    assert_eq!(report.strategy, Some(RegionStrategy::Fallback));
}

#[test]
fn empty_frames_select_the_whole_screen() {
    let frames = vec![frame(Vec::new()), frame(Vec::new()), frame(Vec::new())];
    let report = pipeline(PipelineConfig::default()).analyze_detailed(&frames);

    assert_eq!(report.track_count, 0);
    assert_eq!(report.strategy, Some(RegionStrategy::Fallback));
    assert_eq!(report.selection, SelectionResult::uniform(BoundingBox::FULL_FRAME));
}

#[test]
fn fewer_than_two_valid_frames_is_no_opinion() {
    let pipeline = pipeline(PipelineConfig::default());
    assert!(pipeline.analyze(&menu_frames(&["Menu"])).is_empty());

    let dir = tempfile::tempdir().unwrap();
    let mut frames = menu_frames(&["Menu"]);
    frames.push(FrameInput::from_path(dir.path().join("lost.png"), Vec::new()));
    let report = pipeline.analyze_detailed(&frames);
    assert!(report.selection.is_empty());
    assert_eq!(report.skipped_frames, 1);
}

#[test]
fn transient_popups_do_not_move_the_region() {
    let mut frames = menu_frames(&["Menu", "Menu", "Menu", "Menu"]);
    frames[2]
        .elements
        .push(RawElement::new(9, [60.0, 60.0, 90.0, 90.0], Some("Cookie banner")));

    let with_popup = pipeline(PipelineConfig::default()).analyze_detailed(&frames);
    let without = pipeline(PipelineConfig::default()).analyze_detailed(&menu_frames(&["Menu"; 4]));
    assert_eq!(with_popup.track_count, 2);
    assert_eq!(with_popup.selection.largest_area, without.selection.largest_area);
}

#[test]
fn runs_are_deterministic_and_independent() {
    let frames = menu_frames(&["A", "B", "C", "A"]);
    let pipeline = pipeline(PipelineConfig::default());
    let expected = pipeline.analyze_detailed(&frames);

    let (pipeline, frames) = (&pipeline, &frames);
    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(move || pipeline.analyze_detailed(frames)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(reports.iter().all(|report| *report == expected));
}

#[test]
fn global_assignment_agrees_on_unambiguous_input() {
    let frames = menu_frames(&["A", "B", "A"]);
    let greedy = pipeline(PipelineConfig::default()).analyze(&frames);
    let global = pipeline(PipelineConfig {
        match_strategy: MatchStrategy::GlobalAssignment,
        ..PipelineConfig::default()
    })
    .analyze(&frames);
    assert_eq!(greedy, global);
}
