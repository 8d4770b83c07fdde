// THEORY:
// Ingestion dominates the cost of a run: every element of every frame is cropped and
// sent through the embedder. Frames are independent of each other at that stage, so
// the `ParallelPipeline` fans them out over tokio's blocking pool while the later
// stages, which are sequential by nature (the tracker walks frames in order), run
// once on the collected result.
//
// Key architectural principles:
// 1.  **Bounded Workers**: A semaphore caps how many frames are in flight, sized to
//     the machine by default.
// 2.  **Ordered Join**: Results are joined in submission order, never completion
//     order. Element lists are sorted by id inside each frame, so the output is
//     identical to the synchronous `RegionPipeline` for the same input.
// 3.  **Same Error Policy**: A worker that panics is treated like an unreadable frame:
//     logged, counted as skipped, and the run goes on.

use crate::config::PipelineConfig;
use crate::core_modules::embedder::Embedder;
use crate::core_modules::frame_element::{FrameElement, FrameInput};
use crate::core_modules::rule_selector::SelectionResult;
use crate::error::ConfigError;
use crate::pipeline::{IngestedFrames, RegionPipeline, RegionReport};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub struct ParallelPipeline {
    pipeline: Arc<RegionPipeline>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ParallelPipeline {
    /// One worker per logical CPU.
    pub fn new(config: PipelineConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ConfigError> {
        Self::with_workers(config, embedder, num_cpus::get())
    }

    pub fn with_workers(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        workers: usize,
    ) -> Result<Self, ConfigError> {
        let workers = workers.max(1);
        Ok(Self {
            pipeline: Arc::new(RegionPipeline::new(config, embedder)?),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pipeline(&self) -> &RegionPipeline {
        &self.pipeline
    }

    pub async fn analyze(&self, frames: Vec<FrameInput>) -> SelectionResult {
        self.analyze_detailed(frames).await.selection
    }

    pub async fn analyze_detailed(&self, frames: Vec<FrameInput>) -> RegionReport {
        if frames.len() < 2 {
            return RegionReport::no_opinion(0, 0);
        }

        let ingested = self.ingest(frames).await;
        let valid = ingested.frames.len();
        let skipped = ingested.skipped;

        let pipeline = Arc::clone(&self.pipeline);
        match tokio::task::spawn_blocking(move || pipeline.analyze_elements(ingested)).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "region analysis task failed, returning no opinion");
                RegionReport::no_opinion(valid, skipped)
            }
        }
    }

    /// Builds every frame on the blocking pool, keeping input order.
    pub async fn ingest(&self, frames: Vec<FrameInput>) -> IngestedFrames {
        let tasks = frames.into_iter().enumerate().map(|(frame_index, frame)| {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&self.permits);
            async move { build_on_worker(pipeline, permits, frame_index, frame).await }
        });
        let results = join_all(tasks).await;

        let mut ingested = IngestedFrames::default();
        for elements in results {
            match elements {
                Some(elements) => ingested.frames.push(elements),
                None => ingested.skipped += 1,
            }
        }
        debug!(
            valid = ingested.frames.len(),
            skipped = ingested.skipped,
            workers = self.workers,
            "parallel ingestion complete"
        );
        ingested
    }
}

async fn build_on_worker(
    pipeline: Arc<RegionPipeline>,
    permits: Arc<Semaphore>,
    frame_index: usize,
    frame: FrameInput,
) -> Option<Vec<FrameElement>> {
    let Ok(_permit) = permits.acquire_owned().await else {
        warn!(frame_index, "worker pool closed, skipping frame");
        return None;
    };

    let built = tokio::task::spawn_blocking(move || pipeline.builder().build_frame(frame_index, &frame)).await;
    match built {
        Ok(Ok(elements)) => Some(elements),
        Ok(Err(err)) => {
            warn!(frame_index, error = %err, "skipping frame");
            None
        }
        Err(err) => {
            warn!(frame_index, error = %err, "frame worker failed, skipping frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::embedder::HistogramEmbedder;
    use crate::core_modules::frame_element::RawElement;
    use crate::error::EmbedError;
    use image::{DynamicImage, Rgb, RgbImage};

    /// White screen, dark header.
    fn screen() -> DynamicImage {
        let mut image = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
        for y in 0..12 {
            for x in 0..120 {
                image.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        DynamicImage::ImageRgb8(image)
    }

    fn frames() -> Vec<FrameInput> {
        ["first", "second", "third", "fourth"]
            .into_iter()
            .map(|text| {
                FrameInput::from_image(
                    screen(),
                    vec![
                        RawElement::new(4, [0.2, 0.3, 0.8, 0.9], Some(text)),
                        RawElement::new(1, [0.0, 0.0, 1.0, 0.1], Some("Settings")),
                    ],
                )
            })
            .collect()
    }

    fn parallel(workers: usize) -> ParallelPipeline {
        ParallelPipeline::with_workers(
            PipelineConfig::default(),
            Arc::new(HistogramEmbedder::default()),
            workers,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn matches_the_sequential_pipeline() {
        let inputs = frames();
        let sequential = RegionPipeline::new(PipelineConfig::default(), Arc::new(HistogramEmbedder::default()))
            .unwrap()
            .analyze_detailed(&inputs);

        for workers in [1, 3] {
            let report = parallel(workers).analyze_detailed(inputs.clone()).await;
            assert_eq!(report, sequential);
        }
        assert!(!sequential.selection.is_empty());
    }

    #[tokio::test]
    async fn skipped_frames_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = frames();
        inputs.insert(1, FrameInput::from_path(dir.path().join("missing.png"), Vec::new()));

        let ingested = parallel(2).ingest(inputs).await;
        assert_eq!(ingested.frames.len(), 4);
        assert_eq!(ingested.skipped, 1);
        // Frame indices keep their position in the input, gaps included.
        let indices: Vec<usize> = ingested.frames.iter().map(|f| f[0].frame_index).collect();
        assert_eq!(indices, vec![0, 2, 3, 4]);
        // Elements come back sorted by parser id.
        assert_eq!(ingested.frames[0][0].element_id, 1);
    }

    /// Panics on 13px-wide patches.
    struct FragileEmbedder;

    impl Embedder for FragileEmbedder {
        fn embed(&self, patch: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
            assert_ne!(patch.width(), 13, "unsupported patch width");
            HistogramEmbedder::default().embed(patch)
        }
    }

    #[tokio::test]
    async fn embedder_panics_skip_the_frame_like_the_sequential_pipeline() {
        let mut inputs = frames();
        inputs[2].elements.push(RawElement::new(7, [30.0, 40.0, 43.0, 60.0], None));

        let sequential = RegionPipeline::new(PipelineConfig::default(), Arc::new(FragileEmbedder))
            .unwrap()
            .analyze_detailed(&inputs);
        let parallel = ParallelPipeline::with_workers(PipelineConfig::default(), Arc::new(FragileEmbedder), 2)
            .unwrap()
            .analyze_detailed(inputs)
            .await;

        assert_eq!(sequential.skipped_frames, 1);
        assert_eq!(sequential.valid_frames, 3);
        assert_eq!(parallel, sequential);
    }

    #[tokio::test]
    async fn short_input_has_no_opinion() {
        let pipeline = parallel(2);
        assert!(pipeline.analyze(Vec::new()).await.is_empty());
        let report = pipeline.analyze_detailed(frames().into_iter().take(1).collect()).await;
        assert!(report.selection.is_empty());
        assert_eq!((report.valid_frames, report.skipped_frames), (0, 0));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(parallel(0).workers(), 1);
        let default = ParallelPipeline::new(PipelineConfig::default(), Arc::new(HistogramEmbedder::default())).unwrap();
        assert!(default.workers() >= 1);
    }
}
