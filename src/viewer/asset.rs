use std::path::Path;

use gltf::mesh::Mode;
use serde::Serialize;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some(Self { min, max })
    }

    pub fn center(&self) -> [f32; 3] {
        [0usize, 1, 2].map(|axis| (self.min[axis] + self.max[axis]) * 0.5)
    }

    pub fn size(&self) -> [f32; 3] {
        [0usize, 1, 2].map(|axis| self.max[axis] - self.min[axis])
    }
}

/// CPU-side copy of the mannequin geometry, ready for upload by the webview.
/// Dropping it is what releases the viewer's graphics resources.
#[derive(Debug, Clone)]
pub struct SceneAsset {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub bounds: Bounds,
    pub primitive_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub primitive_count: usize,
    pub bounds: Bounds,
}

impl SceneAsset {
    pub fn from_glb(bytes: &[u8]) -> Result<Self> {
        let (document, buffers, _images) =
            gltf::import_slice(bytes).map_err(|e| AppError::ViewerLoadError(e.to_string()))?;

        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut primitive_count = 0;

        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                let mode = primitive.mode();
                if !matches!(
                    mode,
                    Mode::Triangles | Mode::TriangleStrip | Mode::TriangleFan
                ) {
                    log::debug!("Skipping {mode:?} primitive in mesh {}", mesh.index());
                    continue;
                }

                let reader = primitive
                    .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
                let Some(points) = reader.read_positions() else {
                    continue;
                };

                let base = positions.len() as u32;
                positions.extend(points);
                let added = positions.len() as u32 - base;
                let local: Vec<u32> = match reader.read_indices() {
                    Some(read) => read.into_u32().collect(),
                    None => (0..added).collect(),
                };
                indices.extend(triangle_list(mode, &local).into_iter().map(|i| base + i));
                primitive_count += 1;
            }
        }

        let bounds = Bounds::from_points(&positions).ok_or_else(|| {
            AppError::ViewerLoadError("model contains no mesh geometry".into())
        })?;

        Ok(Self {
            positions,
            indices,
            bounds,
            primitive_count,
        })
    }

    /// Center on the origin and scale to unit height, so every mannequin
    /// frames the same way regardless of its source units.
    pub fn normalize(&mut self) {
        let center = self.bounds.center();
        let height = self.bounds.size()[1];
        let scale = if height > f32::EPSILON { 1.0 / height } else { 1.0 };

        for p in &mut self.positions {
            for axis in 0..3 {
                p[axis] = (p[axis] - center[axis]) * scale;
            }
        }
        if let Some(bounds) = Bounds::from_points(&self.positions) {
            self.bounds = bounds;
        }
    }

    pub fn info(&self) -> SceneInfo {
        SceneInfo {
            vertex_count: self.positions.len(),
            triangle_count: self.indices.len() / 3,
            primitive_count: self.primitive_count,
            bounds: self.bounds,
        }
    }
}

/// Expand strip and fan index order into a plain triangle list.
fn triangle_list(mode: Mode, order: &[u32]) -> Vec<u32> {
    match mode {
        Mode::TriangleStrip => order
            .windows(3)
            .enumerate()
            .flat_map(|(i, w)| {
                // Every other strip triangle flips to keep the winding.
                if i % 2 == 0 {
                    [w[0], w[1], w[2]]
                } else {
                    [w[1], w[0], w[2]]
                }
            })
            .collect(),
        Mode::TriangleFan => match order.split_first() {
            Some((&hub, rim)) => rim
                .windows(2)
                .flat_map(|w| [hub, w[0], w[1]])
                .collect(),
            None => Vec::new(),
        },
        _ => order.chunks_exact(3).flatten().copied().collect(),
    }
}

/// Read and parse a GLB off the async runtime.
pub async fn load_glb(path: &Path) -> Result<SceneAsset> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::ViewerLoadError(format!("{}: {e}", path.display())))?;
    parse_glb(bytes).await
}

pub async fn parse_glb(bytes: Vec<u8>) -> Result<SceneAsset> {
    tokio::task::spawn_blocking(move || {
        let mut asset = SceneAsset::from_glb(&bytes)?;
        asset.normalize();
        Ok(asset)
    })
    .await
    .map_err(|e| AppError::ViewerLoadError(format!("model parser failed: {e}")))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest useful GLB: one non-indexed triangle, 1 wide and 2 tall.
    pub(crate) fn triangle_glb() -> Vec<u8> {
        glb_with(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]], 4)
    }

    /// One non-indexed primitive drawn with the given glTF primitive mode.
    fn glb_with(points: &[[f32; 3]], mode: u32) -> Vec<u8> {
        let bin: Vec<u8> = points
            .iter()
            .flatten()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let bounds = Bounds::from_points(points).unwrap();

        let mut json = serde_json::json!({
            "asset": { "version": "2.0" },
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": bin.len() }],
            "accessors": [{
                "bufferView": 0,
                "componentType": 5126,
                "count": points.len(),
                "type": "VEC3",
                "min": bounds.min,
                "max": bounds.max
            }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "mode": mode }] }],
            "nodes": [{ "mesh": 0 }],
            "scenes": [{ "nodes": [0] }],
            "scene": 0
        })
        .to_string()
        .into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }

    const QUAD: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 0.0],
    ];

    #[test]
    fn parses_triangle_and_synthesizes_indices() {
        let asset = SceneAsset::from_glb(&triangle_glb()).unwrap();
        let info = asset.info();
        assert_eq!(info.vertex_count, 3);
        assert_eq!(info.triangle_count, 1);
        assert_eq!(asset.indices, vec![0, 1, 2]);
        assert_eq!(asset.bounds.max, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn normalize_centers_and_scales_to_unit_height() {
        let mut asset = SceneAsset::from_glb(&triangle_glb()).unwrap();
        asset.normalize();
        assert_eq!(asset.bounds.min, [-0.25, -0.5, 0.0]);
        assert_eq!(asset.bounds.max, [0.25, 0.5, 0.0]);
    }

    #[test]
    fn strips_are_expanded_with_alternating_winding() {
        let asset = SceneAsset::from_glb(&glb_with(&QUAD, 5)).unwrap();
        assert_eq!(asset.info().triangle_count, 2);
        assert_eq!(asset.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn fans_share_the_first_vertex() {
        let asset = SceneAsset::from_glb(&glb_with(&QUAD, 6)).unwrap();
        assert_eq!(asset.info().triangle_count, 2);
        assert_eq!(asset.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn line_only_models_have_no_surface() {
        let err = SceneAsset::from_glb(&glb_with(&QUAD, 1)).unwrap_err();
        assert!(matches!(err, AppError::ViewerLoadError(_)));
    }

    #[test]
    fn garbage_is_a_load_error() {
        let err = SceneAsset::from_glb(b"definitely not a model").unwrap_err();
        assert!(matches!(err, AppError::ViewerLoadError(_)));
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let err = load_glb(Path::new("/nonexistent/mannequin.glb")).await.unwrap_err();
        assert!(matches!(err, AppError::ViewerLoadError(_)));
    }
}
