//! Image-generation dispatch
//!
//! Turns one `NodeNeedsOutputs` snapshot into image blobs and writes them
//! back through the node-update port. The dispatch is a closed match over
//! [`NodeType`]: each arm destructures the config variant, resolves the
//! named inputs it needs, and invokes the corresponding transform.
//!
//! Generation is fire-and-forget from the event handler's perspective and
//! version-guarded at the write-back: when the node moved on while the
//! transform ran, the setter reports the drop and the just-saved blob is
//! deleted again. That is the whole mechanism keeping late completions from
//! corrupting fresh state.

use crate::bus::Shutdown;
use crate::error::{EngineError, Result};
use crate::transforms::ImageTransforms;
use crate::updater::NodeUpdater;
use pixelgraph_core::{
    DomainEvent, GraphError, GraphId, HexColor, ImageId, InputName, NodeConfig, NodeId, NodeType,
};
use pixelgraph_store::BlobStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a generator needs, cheap to clone into spawned tasks
#[derive(Clone)]
pub struct GenerationContext {
    pub blobs: Arc<dyn BlobStore>,
    pub transforms: Arc<dyn ImageTransforms>,
    pub updater: Arc<dyn NodeUpdater>,
}

/// Snapshot of one dispatched generation, taken from `NodeNeedsOutputs`
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub graph_id: GraphId,
    pub node_id: NodeId,
    pub node_version: u64,
    pub node_type: NodeType,
    pub config: NodeConfig,
    pub inputs: BTreeMap<InputName, ImageId>,
}

impl GenerationJob {
    pub fn from_event(event: &DomainEvent) -> Option<Self> {
        match event {
            DomainEvent::NodeNeedsOutputs {
                graph_id,
                node_id,
                node_version,
                node_type,
                config,
                inputs,
            } => Some(Self {
                graph_id: *graph_id,
                node_id: *node_id,
                node_version: *node_version,
                node_type: *node_type,
                config: config.clone(),
                inputs: inputs.clone(),
            }),
            _ => None,
        }
    }

    fn input(&self, name: &str) -> Result<ImageId> {
        self.inputs
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::MissingInput {
                node: self.node_id,
                input: name.to_string(),
            })
    }
}

fn config_mismatch(job: &GenerationJob) -> EngineError {
    EngineError::Domain(GraphError::ConfigMismatch {
        config: job.config.node_type(),
        node_type: job.node_type,
    })
}

/// Run one generation to completion
///
/// Produces the node's single output and a preview thumbnail, both written
/// back at the job's node version.
pub async fn run(ctx: &GenerationContext, job: GenerationJob, shutdown: &Shutdown) -> Result<()> {
    if shutdown.is_cancelled() {
        return Err(EngineError::ShuttingDown);
    }
    tracing::debug!(
        graph_id = %job.graph_id,
        node_id = %job.node_id,
        node_type = %job.node_type,
        node_version = job.node_version,
        "generating outputs"
    );

    let bytes = match job.node_type {
        // Input outputs arrive from outside; nothing to compute.
        NodeType::Input => return Ok(()),
        NodeType::Blur => {
            let NodeConfig::Blur { radius } = &job.config else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("original")?).await?;
            ctx.transforms.blur(&source, *radius)?
        }
        NodeType::Crop => {
            let NodeConfig::Crop {
                left,
                right,
                top,
                bottom,
            } = &job.config
            else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("original")?).await?;
            ctx.transforms.crop(
                &source,
                left.unwrap_or(0),
                right.unwrap_or(0),
                top.unwrap_or(0),
                bottom.unwrap_or(0),
            )?
        }
        NodeType::Resize => {
            let NodeConfig::Resize {
                width,
                height,
                interpolation,
            } = &job.config
            else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("original")?).await?;
            ctx.transforms.resize(&source, *width, *height, *interpolation)?
        }
        NodeType::ResizeMatch => {
            let NodeConfig::ResizeMatch { interpolation } = &job.config else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("original")?).await?;
            let reference = ctx.blobs.get(job.input("size_match")?).await?;
            ctx.transforms
                .resize_to_match(&source, &reference, *interpolation)?
        }
        NodeType::PixelInflate => {
            let NodeConfig::PixelInflate {
                width,
                line_width,
                line_color,
            } = &job.config
            else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("original")?).await?;
            ctx.transforms
                .pixel_inflate(&source, *width, *line_width, *line_color)?
        }
        NodeType::PaletteExtract => {
            let NodeConfig::PaletteExtract { num_colors, method } = &job.config else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("source")?).await?;
            ctx.transforms.extract_palette(&source, *num_colors, *method)?
        }
        NodeType::PaletteApply => {
            let NodeConfig::PaletteApply { normalize } = &job.config else {
                return Err(config_mismatch(&job));
            };
            let source = ctx.blobs.get(job.input("source")?).await?;
            let palette = ctx.blobs.get(job.input("palette")?).await?;
            ctx.transforms.apply_palette(&source, &palette, *normalize)?
        }
        NodeType::PaletteCreate => {
            let NodeConfig::PaletteCreate { colors } = &job.config else {
                return Err(config_mismatch(&job));
            };
            ctx.transforms.render_palette(colors)?
        }
        NodeType::PaletteEdit => {
            let NodeConfig::PaletteEdit { colors } = &job.config else {
                return Err(config_mismatch(&job));
            };
            let enabled: Vec<HexColor> = colors
                .iter()
                .filter(|entry| !entry.disabled)
                .map(|entry| entry.color)
                .collect();
            if enabled.is_empty() {
                // Nothing edited in yet: pass the source palette through.
                let source = ctx.blobs.get(job.input("source")?).await?;
                let inherited = ctx.transforms.palette_colors(&source)?;
                ctx.transforms.render_palette(&inherited)?
            } else {
                ctx.transforms.render_palette(&enabled)?
            }
        }
        NodeType::Output => {
            let source = ctx.blobs.get(job.input("input")?).await?;
            ctx.transforms.reencode(&source)?
        }
    };

    if shutdown.is_cancelled() {
        return Err(EngineError::ShuttingDown);
    }
    let output_name = job
        .node_type
        .output_names()
        .first()
        .copied()
        .unwrap_or_default();
    write_back(ctx, &job, output_name, bytes).await
}

async fn write_back(
    ctx: &GenerationContext,
    job: &GenerationJob,
    output_name: &str,
    bytes: Vec<u8>,
) -> Result<()> {
    let preview = ctx.transforms.thumbnail(&bytes)?;

    let image_id = ImageId::new();
    ctx.blobs.save(image_id, bytes).await?;
    let applied = ctx
        .updater
        .set_node_output_image(job.graph_id, job.node_id, output_name, image_id, job.node_version)
        .await?;
    if !applied {
        // The node moved on while we were computing; drop our blob.
        tracing::debug!(
            graph_id = %job.graph_id,
            node_id = %job.node_id,
            node_version = job.node_version,
            "stale generation result dropped"
        );
        ctx.blobs.remove(image_id).await?;
        return Ok(());
    }

    let preview_id = ImageId::new();
    ctx.blobs.save(preview_id, preview).await?;
    let applied = ctx
        .updater
        .set_node_preview_image(job.graph_id, job.node_id, preview_id, job.node_version)
        .await?;
    if !applied {
        ctx.blobs.remove(preview_id).await?;
    }
    Ok(())
}

/// Render only a preview thumbnail for an already-stored image
///
/// Used for `Input` nodes, whose output image arrives externally and never
/// passes through [`run`].
pub async fn run_preview_only(
    ctx: &GenerationContext,
    graph_id: GraphId,
    node_id: NodeId,
    node_version: u64,
    image_id: ImageId,
    shutdown: &Shutdown,
) -> Result<()> {
    if shutdown.is_cancelled() {
        return Err(EngineError::ShuttingDown);
    }
    let bytes = ctx.blobs.get(image_id).await?;
    let preview = ctx.transforms.thumbnail(&bytes)?;
    let preview_id = ImageId::new();
    ctx.blobs.save(preview_id, preview).await?;
    let applied = ctx
        .updater
        .set_node_preview_image(graph_id, node_id, preview_id, node_version)
        .await?;
    if !applied {
        ctx.blobs.remove(preview_id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::PngTransforms;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use pixelgraph_store::MemoryBlobStore;
    use std::io::Cursor;

    #[derive(Debug, PartialEq)]
    enum Update {
        Output {
            node_id: NodeId,
            output: String,
            node_version: u64,
        },
        Preview {
            node_id: NodeId,
            node_version: u64,
        },
    }

    /// Recording port; `accept` controls the version-guard verdict
    struct FakeUpdater {
        accept: bool,
        updates: Mutex<Vec<Update>>,
    }

    impl FakeUpdater {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self {
                accept,
                updates: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NodeUpdater for FakeUpdater {
        async fn set_node_output_image(
            &self,
            _graph_id: GraphId,
            node_id: NodeId,
            output: &str,
            _image_id: ImageId,
            node_version: u64,
        ) -> Result<bool> {
            self.updates.lock().push(Update::Output {
                node_id,
                output: output.to_string(),
                node_version,
            });
            Ok(self.accept)
        }

        async fn set_node_preview_image(
            &self,
            _graph_id: GraphId,
            node_id: NodeId,
            _image_id: ImageId,
            node_version: u64,
        ) -> Result<bool> {
            self.updates.lock().push(Update::Preview {
                node_id,
                node_version,
            });
            Ok(self.accept)
        }

        async fn set_node_config(
            &self,
            _graph_id: GraphId,
            _node_id: NodeId,
            _config: NodeConfig,
        ) -> Result<bool> {
            Ok(self.accept)
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([128, 64, 32, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn context(updater: Arc<FakeUpdater>) -> (GenerationContext, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let ctx = GenerationContext {
            blobs: blobs.clone(),
            transforms: Arc::new(PngTransforms::new()),
            updater,
        };
        (ctx, blobs)
    }

    fn blur_job(source: ImageId) -> GenerationJob {
        GenerationJob {
            graph_id: GraphId::new(),
            node_id: NodeId::new(),
            node_version: 3,
            node_type: NodeType::Blur,
            config: NodeConfig::Blur { radius: 1 },
            inputs: BTreeMap::from([("original".to_string(), source)]),
        }
    }

    #[tokio::test]
    async fn test_blur_generation_writes_output_and_preview() {
        let updater = FakeUpdater::new(true);
        let (ctx, blobs) = context(updater.clone());
        let source = ImageId::new();
        blobs.save(source, png(8, 8)).await.unwrap();

        let job = blur_job(source);
        let node_id = job.node_id;
        run(&ctx, job, &Shutdown::never()).await.unwrap();

        let updates = updater.updates.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0],
            Update::Output {
                node_id,
                output: "blurred".to_string(),
                node_version: 3,
            }
        );
        assert_eq!(updates[1], Update::Preview { node_id, node_version: 3 });
        // Source + generated output + preview.
        assert_eq!(blobs.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_write_back_removes_the_blob() {
        let updater = FakeUpdater::new(false);
        let (ctx, blobs) = context(updater.clone());
        let source = ImageId::new();
        blobs.save(source, png(4, 4)).await.unwrap();

        run(&ctx, blur_job(source), &Shutdown::never()).await.unwrap();

        // Output write was rejected, its blob deleted, no preview attempted.
        assert_eq!(updater.updates.lock().len(), 1);
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_config_variant_mismatch_is_an_error() {
        let updater = FakeUpdater::new(true);
        let (ctx, blobs) = context(updater.clone());
        let source = ImageId::new();
        blobs.save(source, png(4, 4)).await.unwrap();

        let mut job = blur_job(source);
        job.config = NodeConfig::Output;
        let result = run(&ctx, job, &Shutdown::never()).await;
        assert!(matches!(
            result,
            Err(EngineError::Domain(GraphError::ConfigMismatch { .. }))
        ));
        assert!(updater.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let updater = FakeUpdater::new(true);
        let (ctx, _blobs) = context(updater.clone());

        let mut job = blur_job(ImageId::new());
        job.inputs.clear();
        let result = run(&ctx, job, &Shutdown::never()).await;
        assert!(matches!(result, Err(EngineError::MissingInput { .. })));
    }

    #[tokio::test]
    async fn test_input_nodes_never_generate() {
        let updater = FakeUpdater::new(true);
        let (ctx, blobs) = context(updater.clone());

        let job = GenerationJob {
            graph_id: GraphId::new(),
            node_id: NodeId::new(),
            node_version: 1,
            node_type: NodeType::Input,
            config: NodeConfig::Input,
            inputs: BTreeMap::new(),
        };
        run(&ctx, job, &Shutdown::never()).await.unwrap();
        assert!(updater.updates.lock().is_empty());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_preview_only_generation() {
        let updater = FakeUpdater::new(true);
        let (ctx, blobs) = context(updater.clone());
        let image_id = ImageId::new();
        blobs.save(image_id, png(64, 32)).await.unwrap();

        let node_id = NodeId::new();
        run_preview_only(&ctx, GraphId::new(), node_id, 7, image_id, &Shutdown::never())
            .await
            .unwrap();

        let updates = updater.updates.lock();
        assert_eq!(updates[..], [Update::Preview { node_id, node_version: 7 }]);
        assert_eq!(blobs.len(), 2);
    }

    #[tokio::test]
    async fn test_palette_create_needs_no_inputs() {
        let updater = FakeUpdater::new(true);
        let (ctx, blobs) = context(updater.clone());

        let job = GenerationJob {
            graph_id: GraphId::new(),
            node_id: NodeId::new(),
            node_version: 1,
            node_type: NodeType::PaletteCreate,
            config: NodeConfig::PaletteCreate {
                colors: vec![HexColor::rgb(255, 0, 0)],
            },
            inputs: BTreeMap::new(),
        };
        run(&ctx, job, &Shutdown::never()).await.unwrap();
        assert_eq!(updater.updates.lock().len(), 2);
        assert_eq!(blobs.len(), 2);
    }
}
