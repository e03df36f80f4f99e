//! Mesh ingestion: format sniffing and parsing for the three formats the
//! viewer accepts (binary STL, ASCII STL, OBJ), plus the normalization
//! applied to every loaded mesh.
//!
//! All formats are reduced to a triangle soup; no shared-vertex indexing.

use glam::Vec3;
use thiserror::Error;

/// Largest bounding-box extent after [`TriangleMesh::center_and_scale`].
pub const NORMALIZED_EXTENT: f32 = 10.0;

/// Binary STL framing: 80-byte header + u32 facet count.
const BINARY_STL_HEADER: usize = 84;
/// Bytes per binary STL facet: normal + 3 vertices (12 floats) + attribute u16.
const BINARY_STL_FACET: usize = 50;
/// Slack allowed between the declared and actual byte length, so files with
/// trailing padding or metadata still pass the binary probe.
const BINARY_STL_LENGTH_SLACK: usize = 100;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("buffer does not match any supported mesh format")]
    UnrecognizedFormat,
    #[error("ASCII STL contains no vertex data")]
    MalformedStl,
    #[error("OBJ contains no usable vertices")]
    NoVerticesFound,
}

/// Triangle soup: every three consecutive positions form one triangle, with
/// a parallel per-vertex normal sequence of the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl TriangleMesh {
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Axis-aligned bounding box over all positions.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in &self.positions {
            min = min.min(*v);
            max = max.max(*v);
        }
        (min, max)
    }

    /// Translate the bounding-box center to the origin and uniformly scale
    /// the largest extent to `target_extent`. Normals are unaffected.
    pub fn center_and_scale(&mut self, target_extent: f32) {
        if self.is_empty() {
            return;
        }
        let (min, max) = self.bounds();
        let center = (min + max) * 0.5;
        let size = max - min;
        let max_dim = size.x.max(size.y).max(size.z);
        let scale = if max_dim > 1e-6 { target_extent / max_dim } else { 1.0 };
        for v in &mut self.positions {
            *v = (*v - center) * scale;
        }
    }

    /// Interleaved position + normal floats for GPU upload (stride 24).
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 6);
        for (p, n) in self.positions.iter().zip(&self.normals) {
            out.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z]);
        }
        out
    }
}

/// Sniff and parse a raw byte buffer. Probes are attempted in order
/// (binary STL, ASCII STL, OBJ) and the first success wins.
pub fn parse(bytes: &[u8]) -> Result<TriangleMesh, ParseError> {
    if let Some(mesh) = probe_binary_stl(bytes) {
        log::debug!("parsed binary STL: {} triangles", mesh.triangle_count());
        return Ok(mesh);
    }
    let text = String::from_utf8_lossy(bytes);
    if text.contains("facet normal") {
        let mesh = parse_ascii_stl(&text)?;
        log::debug!("parsed ASCII STL: {} triangles", mesh.triangle_count());
        return Ok(mesh);
    }
    let mesh = parse_obj(&text)?;
    log::debug!("parsed OBJ: {} triangles", mesh.triangle_count());
    Ok(mesh)
}

/// Binary STL: 80-byte header, little-endian u32 facet count, then 50-byte
/// facets (normal + 3 vertices + attribute count). A buffer only qualifies
/// when its length is within [`BINARY_STL_LENGTH_SLACK`] of the length the
/// facet count implies; that guards against text files whose bytes 80..84
/// happen to decode to a count.
fn probe_binary_stl(bytes: &[u8]) -> Option<TriangleMesh> {
    if bytes.len() < BINARY_STL_HEADER {
        return None;
    }
    let count = u32::from_le_bytes(bytes[80..84].try_into().ok()?) as usize;
    let expected = count
        .checked_mul(BINARY_STL_FACET)
        .and_then(|n| n.checked_add(BINARY_STL_HEADER))?;
    if expected.abs_diff(bytes.len()) >= BINARY_STL_LENGTH_SLACK {
        return None;
    }

    let mut positions = Vec::with_capacity(count * 3);
    let mut normals = Vec::with_capacity(count * 3);
    let mut offset = BINARY_STL_HEADER;
    for _ in 0..count {
        // The slack tolerance admits slightly short buffers; stop rather
        // than read past the end.
        if offset + BINARY_STL_FACET > bytes.len() {
            break;
        }
        let normal = read_vec3(bytes, offset);
        for i in 0..3 {
            positions.push(read_vec3(bytes, offset + 12 + i * 12));
            normals.push(normal);
        }
        offset += BINARY_STL_FACET;
    }
    Some(TriangleMesh { positions, normals })
}

fn read_vec3(bytes: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f32(bytes, offset),
        read_f32(bytes, offset + 4),
        read_f32(bytes, offset + 8),
    )
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// ASCII STL: `facet normal nx ny nz` sets the current normal, each
/// following `vertex x y z` appends a position carrying that normal.
fn parse_ascii_stl(text: &str) -> Result<TriangleMesh, ParseError> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut current_normal = Vec3::ZERO;
    for line in text.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("facet normal") {
            current_normal = parse_three_floats(rest).unwrap_or(Vec3::ZERO);
        } else if let Some(rest) = line.strip_prefix("vertex") {
            if let Some(v) = parse_three_floats(rest) {
                positions.push(v);
                normals.push(current_normal);
            }
        }
    }
    if positions.is_empty() {
        return Err(ParseError::MalformedStl);
    }
    Ok(TriangleMesh { positions, normals })
}

fn parse_three_floats(s: &str) -> Option<Vec3> {
    let mut it = s.split_whitespace();
    let x = it.next()?.parse().ok()?;
    let y = it.next()?.parse().ok()?;
    let z = it.next()?.parse().ok()?;
    Some(Vec3::new(x, y, z))
}

/// OBJ: `v x y z` lines build a 1-based vertex table, `f` lines emit
/// triangles, fanning polygons with more than three corners. OBJ carries no
/// usable per-facet normal for soup output, so normals are recomputed per
/// face afterwards.
fn parse_obj(text: &str) -> Result<TriangleMesh, ParseError> {
    let mut table: Vec<Vec3> = Vec::new();
    let mut positions = Vec::new();
    let mut saw_obj_line = false;

    for line in text.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("v ") {
            saw_obj_line = true;
            if let Some(v) = parse_three_floats(rest) {
                table.push(v);
            }
        } else if let Some(rest) = line.strip_prefix("f ") {
            saw_obj_line = true;
            let corners: Vec<Vec3> = rest
                .split_whitespace()
                .filter_map(|token| resolve_obj_index(token, table.len()))
                .map(|i| table[i])
                .collect();
            // Triangle fan: corner 0 against every subsequent edge.
            for i in 1..corners.len().saturating_sub(1) {
                positions.push(corners[0]);
                positions.push(corners[i]);
                positions.push(corners[i + 1]);
            }
        }
    }

    if !saw_obj_line {
        return Err(ParseError::UnrecognizedFormat);
    }
    if positions.is_empty() {
        return Err(ParseError::NoVerticesFound);
    }
    let normals = face_normals(&positions);
    Ok(TriangleMesh { positions, normals })
}

/// Resolve one face token (`7`, `7/2`, `7/2/3`, `-1`) to a 0-based index
/// into the vertex table. Out-of-range references are dropped.
fn resolve_obj_index(token: &str, table_len: usize) -> Option<usize> {
    let head = token.split('/').next()?;
    let raw: i64 = head.parse().ok()?;
    let index = if raw > 0 {
        (raw - 1) as usize
    } else if raw < 0 {
        table_len.checked_sub(raw.unsigned_abs() as usize)?
    } else {
        return None;
    };
    (index < table_len).then_some(index)
}

/// Per-face normals from the cross product of two edges, replicated onto
/// each of the triangle's three vertices.
pub fn face_normals(positions: &[Vec3]) -> Vec<Vec3> {
    let mut normals = Vec::with_capacity(positions.len());
    for tri in positions.chunks_exact(3) {
        let n = (tri[1] - tri[0])
            .cross(tri[2] - tri[0])
            .try_normalize()
            .unwrap_or(Vec3::Z);
        normals.extend_from_slice(&[n, n, n]);
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a binary STL buffer from (normal, [v0, v1, v2]) facets.
    fn binary_stl(facets: &[(Vec3, [Vec3; 3])]) -> Vec<u8> {
        let mut out = vec![0u8; 80];
        out.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for (n, verts) in facets {
            for v in std::iter::once(n).chain(verts.iter()) {
                out.extend_from_slice(&v.x.to_le_bytes());
                out.extend_from_slice(&v.y.to_le_bytes());
                out.extend_from_slice(&v.z.to_le_bytes());
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        out
    }

    fn facet(i: f32) -> (Vec3, [Vec3; 3]) {
        (
            Vec3::new(0.0, 0.0, 1.0),
            [
                Vec3::new(i, 0.0, 0.0),
                Vec3::new(i + 1.0, 0.0, 0.0),
                Vec3::new(i, 1.0, 0.0),
            ],
        )
    }

    #[test]
    fn binary_stl_round_trip() {
        for n in [0usize, 1, 2, 7] {
            let facets: Vec<_> = (0..n).map(|i| facet(i as f32)).collect();
            let mesh = parse(&binary_stl(&facets)).unwrap();
            assert_eq!(mesh.triangle_count(), n);
            assert_eq!(mesh.positions.len(), 3 * n);
            assert_eq!(mesh.normals.len(), 3 * n);
            for (i, f) in facets.iter().enumerate() {
                assert_eq!(mesh.positions[3 * i..3 * i + 3], f.1);
                assert!(mesh.normals[3 * i..3 * i + 3].iter().all(|m| *m == f.0));
            }
        }
    }

    #[test]
    fn binary_stl_tolerates_trailing_padding() {
        let mut bytes = binary_stl(&[facet(0.0), facet(1.0)]);
        bytes.extend_from_slice(&[0u8; 60]);
        let mesh = parse(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn binary_probe_rejects_large_length_mismatch() {
        let mut bytes = binary_stl(&[facet(0.0)]);
        // Claim 100 facets while carrying one: way outside the slack.
        bytes[80..84].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(parse(&bytes), Err(ParseError::UnrecognizedFormat)));
    }

    /// An ASCII STL body padded so that bytes 80..84 decode to a facet count
    /// consistent with the total length must dispatch as binary; the same
    /// body with an implausible count must dispatch as ASCII.
    #[test]
    fn probe_ordering_binary_wins_on_plausible_length() {
        let ascii = b"solid t\nfacet normal 0 0 1\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\n";
        let mut bytes = ascii.to_vec();
        bytes.resize(80, b' ');
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[b' '; 50]);
        assert_eq!(bytes.len(), 134);

        let mesh = parse(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        // Binary path: the "normal" is garbage decoded from padding bytes,
        // not the (0, 0, 1) the ASCII text declares.
        assert!(mesh.normals[0].z.abs() < 0.5);
    }

    #[test]
    fn probe_ordering_falls_back_to_ascii() {
        let ascii = b"solid t\nfacet normal 0 0 1\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\n";
        let mut bytes = ascii.to_vec();
        bytes.resize(80, b' ');
        // Implausible facet count fails the length tolerance.
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[b' '; 50]);

        let mesh = parse(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.normals[0], Vec3::Z);
        assert_eq!(mesh.positions[1], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn ascii_stl_without_vertices_is_malformed() {
        let text = b"solid empty\nfacet normal 0 0 1\nendfacet\nendsolid empty\n";
        assert!(matches!(parse(text), Err(ParseError::MalformedStl)));
    }

    #[test]
    fn obj_quad_fans_into_two_triangles() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = parse(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        let expect = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert_eq!(mesh.positions, expect);
        // Planar CCW quad: every face normal points along +Z.
        assert!(mesh.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
    }

    #[test]
    fn obj_resolves_slash_and_negative_indices() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1/1/1 2/2/2 -1/3/3\n";
        let mesh = parse(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.positions[2], Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn obj_without_faces_yields_no_vertices() {
        let obj = b"v 0 0 0\nv 1 0 0\n# no faces declared\n";
        assert!(matches!(parse(obj), Err(ParseError::NoVerticesFound)));
    }

    #[test]
    fn comment_only_text_is_unrecognized() {
        let text = b"# just a comment\n\n# another\n";
        assert!(matches!(parse(text), Err(ParseError::UnrecognizedFormat)));
    }

    #[test]
    fn arbitrary_bytes_are_unrecognized() {
        let bytes = vec![0xABu8; 200];
        assert!(matches!(parse(&bytes), Err(ParseError::UnrecognizedFormat)));
    }

    #[test]
    fn center_and_scale_normalizes_bounds() {
        let obj = b"v 10 10 10\nv 30 10 10\nv 10 14 10\nf 1 2 3\n";
        let mut mesh = parse(obj).unwrap();
        mesh.center_and_scale(NORMALIZED_EXTENT);
        let (min, max) = mesh.bounds();
        let center = (min + max) * 0.5;
        assert!(center.length() < 1e-4);
        let size = max - min;
        assert!((size.x.max(size.y).max(size.z) - NORMALIZED_EXTENT).abs() < 1e-4);
    }

    #[test]
    fn degenerate_triangle_gets_fallback_normal() {
        let positions = vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];
        assert_eq!(face_normals(&positions), vec![Vec3::Z; 3]);
    }
}
