//! Mesh slots and the tiered asset pipeline.
//!
//! Each slot is loaded independently: fetch the source bytes, parse them,
//! and on any failure fall through an ordered strategy list (bundled
//! reference asset, then procedural placeholder) so a slot with a source
//! URL always ends up renderable. Results arrive through a shared inbox the
//! UI thread drains once per frame.

use crate::mesh::{self, NORMALIZED_EXTENT, TriangleMesh};
use glam::Vec3;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(pub String);

/// The three logical mesh slots of a restoration case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotKind {
    UpperJaw,
    LowerJaw,
    Restoration,
}

pub const SLOT_KINDS: [SlotKind; 3] = [
    SlotKind::UpperJaw,
    SlotKind::LowerJaw,
    SlotKind::Restoration,
];

impl SlotKind {
    pub fn index(self) -> usize {
        match self {
            SlotKind::UpperJaw => 0,
            SlotKind::LowerJaw => 1,
            SlotKind::Restoration => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SlotKind::UpperJaw => "Upper jaw",
            SlotKind::LowerJaw => "Lower jaw",
            SlotKind::Restoration => "Restoration",
        }
    }

    /// Fixed material color per slot, straight (non-premultiplied) RGBA.
    pub fn color(self) -> [f32; 4] {
        match self {
            SlotKind::UpperJaw => [0.961, 0.961, 0.863, 0.8],
            SlotKind::LowerJaw => [1.0, 0.894, 0.882, 0.8],
            SlotKind::Restoration => [0.545, 0.616, 0.765, 0.9],
        }
    }

    /// World offset keeping the normalized meshes articulated instead of
    /// stacked at the origin.
    pub fn offset(self) -> Vec3 {
        match self {
            SlotKind::UpperJaw => Vec3::new(0.0, 4.0, 0.0),
            SlotKind::LowerJaw => Vec3::new(0.0, -4.0, 0.0),
            SlotKind::Restoration => Vec3::new(0.0, 1.0, 0.0),
        }
    }

    fn bundled_asset(self) -> &'static [u8] {
        match self {
            SlotKind::UpperJaw => include_bytes!("../assets/upper_jaw.stl"),
            SlotKind::LowerJaw => include_bytes!("../assets/lower_jaw.stl"),
            SlotKind::Restoration => include_bytes!("../assets/restoration.stl"),
        }
    }

    fn placeholder(self) -> TriangleMesh {
        match self {
            SlotKind::UpperJaw => jaw_placeholder(20.0, 6.0, 12.0, 1.5),
            SlotKind::LowerJaw => jaw_placeholder(18.0, 6.0, 11.0, -1.2),
            SlotKind::Restoration => crown_placeholder(),
        }
    }
}

/// Which strategy ended up populating a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadTier {
    Source,
    BundledAsset,
    Placeholder,
}

/// What happened to the slot's own source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceOutcome {
    Success,
    FetchFailed,
    ParseFailed,
}

/// Diagnostic record for one slot load. Emitted to the log, never to the
/// user.
#[derive(Debug, Clone, Serialize)]
pub struct LoadAttempt {
    pub kind: SlotKind,
    pub url: String,
    pub outcome: SourceOutcome,
    pub tier: LoadTier,
    pub detail: Option<String>,
}

/// A slot resolved down to renderable geometry.
pub struct ResolvedSlot {
    pub kind: SlotKind,
    pub mesh: TriangleMesh,
    pub attempt: LoadAttempt,
}

/// One of the viewer's three mesh entries. Geometry stays `None` until a
/// load resolves (or forever, for slots without a source URL).
pub struct MeshSlot {
    pub kind: SlotKind,
    pub geometry: Option<TriangleMesh>,
    pub visible: bool,
    pub attempt: Option<LoadAttempt>,
    /// Set when geometry changed and the GPU copy is stale.
    pub needs_upload: bool,
}

impl MeshSlot {
    pub fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            geometry: None,
            visible: true,
            attempt: None,
            needs_upload: false,
        }
    }

    pub fn install(&mut self, resolved: ResolvedSlot) {
        self.geometry = Some(resolved.mesh);
        self.attempt = Some(resolved.attempt);
        self.needs_upload = true;
    }

    pub fn clear(&mut self) {
        self.geometry = None;
        self.attempt = None;
        self.needs_upload = false;
    }

    pub fn renderable(&self) -> bool {
        self.visible && self.geometry.as_ref().is_some_and(|g| !g.is_empty())
    }
}

/// Resolve a slot from the outcome of its source fetch, falling through the
/// strategy tiers until one yields geometry.
pub fn resolve_slot(
    kind: SlotKind,
    url: &str,
    fetched: Result<Vec<u8>, FetchError>,
) -> ResolvedSlot {
    resolve_with_asset(kind, url, fetched, kind.bundled_asset())
}

fn resolve_with_asset(
    kind: SlotKind,
    url: &str,
    fetched: Result<Vec<u8>, FetchError>,
    bundled: &[u8],
) -> ResolvedSlot {
    let (outcome, detail) = match &fetched {
        Ok(bytes) => match mesh::parse(bytes) {
            Ok(parsed) => {
                return finish(kind, url, parsed, SourceOutcome::Success, LoadTier::Source, None);
            }
            Err(e) => (SourceOutcome::ParseFailed, Some(e.to_string())),
        },
        Err(e) => (SourceOutcome::FetchFailed, Some(e.to_string())),
    };

    match mesh::parse(bundled) {
        Ok(parsed) => finish(kind, url, parsed, outcome, LoadTier::BundledAsset, detail),
        Err(e) => {
            // FallbackAssetUnavailable: last tier is pure computation and
            // cannot fail.
            log::warn!("bundled asset for {:?} unusable: {e}", kind);
            finish(kind, url, kind.placeholder(), outcome, LoadTier::Placeholder, detail)
        }
    }
}

fn finish(
    kind: SlotKind,
    url: &str,
    mut mesh: TriangleMesh,
    outcome: SourceOutcome,
    tier: LoadTier,
    detail: Option<String>,
) -> ResolvedSlot {
    mesh.center_and_scale(NORMALIZED_EXTENT);
    let attempt = LoadAttempt {
        kind,
        url: url.to_string(),
        outcome,
        tier,
        detail,
    };
    ResolvedSlot { kind, mesh, attempt }
}

// ── procedural placeholders ─────────────────────────────────────────

/// Schematic jaw: a box segmented along X with an arch-curve displacement
/// `y += sin(|x| * 0.1) * curve` on the shared vertex ring.
fn jaw_placeholder(width: f32, height: f32, depth: f32, curve: f32) -> TriangleMesh {
    const SEGMENTS: usize = 8;
    let (hw, hh, hd) = (width / 2.0, height / 2.0, depth / 2.0);

    let mut vertices = Vec::with_capacity((SEGMENTS + 1) * 4);
    for i in 0..=SEGMENTS {
        let x = -hw + width * i as f32 / SEGMENTS as f32;
        let dy = (x.abs() * 0.1).sin() * curve;
        vertices.push(Vec3::new(x, -hh + dy, -hd));
        vertices.push(Vec3::new(x, hh + dy, -hd));
        vertices.push(Vec3::new(x, hh + dy, hd));
        vertices.push(Vec3::new(x, -hh + dy, hd));
    }

    let mut indices: Vec<[usize; 3]> = Vec::new();
    for i in 0..SEGMENTS {
        let a = i * 4;
        let b = (i + 1) * 4;
        // Four side walls between ring i and ring i+1.
        for e in 0..4 {
            let (c0, c1) = (e, (e + 1) % 4);
            indices.push([a + c0, b + c0, b + c1]);
            indices.push([a + c0, b + c1, a + c1]);
        }
    }
    // End caps.
    indices.push([0, 1, 2]);
    indices.push([0, 2, 3]);
    let last = SEGMENTS * 4;
    indices.push([last, last + 2, last + 1]);
    indices.push([last, last + 3, last + 2]);

    soup_from_indexed(&vertices, &indices)
}

/// Schematic crown: an 8-segment tapered cylinder with caps, roughened by a
/// deterministic index-seeded displacement of the shared vertex table.
fn crown_placeholder() -> TriangleMesh {
    const SEGMENTS: usize = 8;
    const R_TOP: f32 = 2.0;
    const R_BOTTOM: f32 = 3.0;
    const HALF_HEIGHT: f32 = 3.0;

    let mut vertices = Vec::with_capacity(SEGMENTS * 2 + 2);
    for i in 0..SEGMENTS {
        let t = std::f32::consts::TAU * i as f32 / SEGMENTS as f32;
        vertices.push(Vec3::new(R_BOTTOM * t.cos(), -HALF_HEIGHT, R_BOTTOM * t.sin()));
    }
    for i in 0..SEGMENTS {
        let t = std::f32::consts::TAU * i as f32 / SEGMENTS as f32;
        vertices.push(Vec3::new(R_TOP * t.cos(), HALF_HEIGHT, R_TOP * t.sin()));
    }
    let bottom_center = vertices.len();
    vertices.push(Vec3::new(0.0, -HALF_HEIGHT, 0.0));
    let top_center = vertices.len();
    vertices.push(Vec3::new(0.0, HALF_HEIGHT, 0.0));

    // Roughen the shared table before expansion so the surface stays
    // crack-free and repeated generation is byte-identical.
    for (i, v) in vertices.iter_mut().enumerate() {
        let i = i as u32;
        v.x += (index_hash(i * 3) - 0.5) * 0.8;
        v.y += (index_hash(i * 3 + 1) - 0.5) * 0.4;
        v.z += (index_hash(i * 3 + 2) - 0.5) * 0.8;
    }

    let mut indices: Vec<[usize; 3]> = Vec::new();
    for i in 0..SEGMENTS {
        let j = (i + 1) % SEGMENTS;
        let (b0, b1) = (i, j);
        let (t0, t1) = (SEGMENTS + i, SEGMENTS + j);
        indices.push([b0, t0, t1]);
        indices.push([b0, t1, b1]);
        indices.push([bottom_center, b0, b1]);
        indices.push([top_center, t1, t0]);
    }

    soup_from_indexed(&vertices, &indices)
}

/// Deterministic hash of a vertex-component index onto [0, 1). Integer
/// mixing only, so placeholder geometry is bit-identical on every run and
/// platform.
fn index_hash(i: u32) -> f32 {
    let mut x = i.wrapping_mul(0x9E37_79B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    (x & 0x00FF_FFFF) as f32 / 16_777_216.0
}

fn soup_from_indexed(vertices: &[Vec3], indices: &[[usize; 3]]) -> TriangleMesh {
    let mut positions = Vec::with_capacity(indices.len() * 3);
    for tri in indices {
        for &i in tri {
            positions.push(vertices[i]);
        }
    }
    let normals = mesh::face_normals(&positions);
    TriangleMesh { positions, normals }
}

// ── fetch + async handoff ───────────────────────────────────────────

#[cfg(target_arch = "wasm32")]
pub async fn fetch_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    let response = gloo_net::http::Request::get(url)
        .send()
        .await
        .map_err(|e| FetchError(e.to_string()))?;
    if !response.ok() {
        return Err(FetchError(format!("HTTP {}", response.status())));
    }
    response
        .binary()
        .await
        .map_err(|e| FetchError(e.to_string()))
}

/// Native builds resolve source locators as filesystem paths.
#[cfg(not(target_arch = "wasm32"))]
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    std::fs::read(url).map_err(|e| FetchError(format!("{url}: {e}")))
}

/// A resolved slot waiting in the inbox, tagged with the load generation it
/// belongs to so completions against a torn-down scene are dropped.
pub struct LoadedSlot {
    pub generation: u64,
    pub resolved: ResolvedSlot,
}

pub type LoadInbox = Arc<Mutex<Vec<LoadedSlot>>>;

/// Fetch, resolve and deliver one slot without blocking the UI thread.
/// Slots load concurrently and may complete in any order.
pub fn spawn_slot_load(kind: SlotKind, url: String, generation: u64, inbox: LoadInbox) {
    #[cfg(target_arch = "wasm32")]
    wasm_bindgen_futures::spawn_local(async move {
        let fetched = fetch_bytes(&url).await;
        let resolved = resolve_slot(kind, &url, fetched);
        inbox.lock().unwrap().push(LoadedSlot { generation, resolved });
    });

    #[cfg(not(target_arch = "wasm32"))]
    std::thread::spawn(move || {
        let fetched = fetch_bytes(&url);
        let resolved = resolve_slot(kind, &url, fetched);
        inbox.lock().unwrap().push(LoadedSlot { generation, resolved });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &[u8] = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";

    #[test]
    fn source_bytes_win_the_pipeline() {
        for kind in SLOT_KINDS {
            let resolved = resolve_slot(kind, "case.obj", Ok(QUAD_OBJ.to_vec()));
            assert_eq!(resolved.attempt.tier, LoadTier::Source);
            assert_eq!(resolved.attempt.outcome, SourceOutcome::Success);
            assert_eq!(resolved.mesh.triangle_count(), 2);
        }
    }

    #[test]
    fn fetch_failure_falls_back_to_bundled_asset() {
        let resolved = resolve_slot(
            SlotKind::UpperJaw,
            "http://nowhere/missing.stl",
            Err(FetchError("HTTP 404".into())),
        );
        assert_eq!(resolved.attempt.outcome, SourceOutcome::FetchFailed);
        assert_eq!(resolved.attempt.tier, LoadTier::BundledAsset);
        assert!(!resolved.mesh.is_empty());
    }

    #[test]
    fn parse_failure_falls_back_to_bundled_asset() {
        let resolved = resolve_slot(SlotKind::LowerJaw, "junk.bin", Ok(vec![0xABu8; 200]));
        assert_eq!(resolved.attempt.outcome, SourceOutcome::ParseFailed);
        assert_eq!(resolved.attempt.tier, LoadTier::BundledAsset);
        assert!(!resolved.mesh.is_empty());
        assert!(resolved.attempt.detail.is_some());
    }

    #[test]
    fn unusable_bundled_asset_falls_back_to_placeholder() {
        for kind in SLOT_KINDS {
            let resolved = resolve_with_asset(
                kind,
                "x.stl",
                Err(FetchError("offline".into())),
                b"# not a mesh\n",
            );
            assert_eq!(resolved.attempt.tier, LoadTier::Placeholder);
            assert!(!resolved.mesh.is_empty());
        }
    }

    #[test]
    fn placeholders_are_deterministic() {
        for kind in SLOT_KINDS {
            let a = kind.placeholder();
            let b = kind.placeholder();
            assert_eq!(a, b);
            assert!(!a.is_empty());
            assert_eq!(a.positions.len(), a.normals.len());
            assert_eq!(a.positions.len() % 3, 0);
        }
    }

    #[test]
    fn bundled_assets_parse_with_the_shipped_parser() {
        for kind in SLOT_KINDS {
            let parsed = mesh::parse(kind.bundled_asset()).unwrap();
            assert!(parsed.triangle_count() > 0, "{:?}", kind);
        }
    }

    #[test]
    fn resolved_meshes_are_normalized() {
        let resolved = resolve_slot(SlotKind::Restoration, "case.obj", Ok(QUAD_OBJ.to_vec()));
        let (min, max) = resolved.mesh.bounds();
        let size = max - min;
        assert!((size.x.max(size.y).max(size.z) - NORMALIZED_EXTENT).abs() < 1e-3);
    }

    #[test]
    fn three_slot_scenario_with_visibility_toggle() {
        let mut slots: Vec<MeshSlot> = SLOT_KINDS.iter().map(|k| MeshSlot::new(*k)).collect();
        for slot in &mut slots {
            assert!(slot.visible);
            let resolved = resolve_slot(slot.kind, "case.obj", Ok(QUAD_OBJ.to_vec()));
            slot.install(resolved);
        }
        assert_eq!(slots.iter().filter(|s| s.renderable()).count(), 3);

        slots[SlotKind::UpperJaw.index()].visible = false;
        assert_eq!(slots.iter().filter(|s| s.renderable()).count(), 2);
    }

    #[test]
    fn stale_generation_results_are_identifiable() {
        let inbox: LoadInbox = Arc::new(Mutex::new(Vec::new()));
        let resolved = resolve_slot(SlotKind::UpperJaw, "a.obj", Ok(QUAD_OBJ.to_vec()));
        inbox.lock().unwrap().push(LoadedSlot { generation: 1, resolved });
        let current_generation = 2u64;
        let drained: Vec<_> = inbox.lock().unwrap().drain(..).collect();
        assert!(drained.iter().all(|l| l.generation != current_generation));
    }
}
