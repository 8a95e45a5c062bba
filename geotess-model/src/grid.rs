//! Multi-resolution triangular tessellations of the unit sphere
//!
//! A [`Grid`] is an immutable vertex table plus triangle table, organized
//! into one or more tessellations of nested levels related by 4-to-1
//! refinement. Adjacency (neighbors, descendants, circumcenters, the
//! triangles touching each vertex) is derived lazily and cached; point
//! location walks across neighbors at a level and descends through
//! descendants between levels.
//!
//! A grid is identified by a 32-character uppercase hex MD5 digest over
//! the canonical little-endian bytes of its vertex and triangle tables.
//! Two grids with the same id are interchangeable across models.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use log::{debug, trace};
use md5::{Digest, Md5};

use geotess_geom::vector::{triangle_center, triangle_contains};
use geotess_geom::Vec3;

use crate::error::{GeoTessError, GeoTessErrorKind, Result};
use crate::io::stream::{AsciiReader, AsciiWriter, BinReader, BinWriter};

/// Magic written at the head of every grid file.
pub const GRID_MAGIC: &str = "GEOTESSGRID";

/// Grid file format version this crate reads and writes.
pub const GRID_FORMAT_VERSION: u32 = 2;

/// Inclusive range of triangle indices forming one level of a
/// tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSpan {
    pub first: u32,
    pub last: u32,
}

impl LevelSpan {
    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    pub fn contains(&self, t: u32) -> bool {
        t >= self.first && t <= self.last
    }
}

type CacheResult<T> = std::result::Result<T, String>;

/// Immutable spherical triangulation with lazy adjacency caches.
pub struct Grid {
    software_version: String,
    generation_date: String,
    description: String,
    grid_id: String,
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    /// Per tessellation, per level, the triangle span.
    tessellations: Vec<Vec<LevelSpan>>,
    /// Cumulative level count before each tessellation, for flat
    /// per-level cache indexing.
    level_offset: Vec<usize>,

    // Lazy caches. Each fills once under the lock; readers either see the
    // filled state or compute it. Failures are cached as messages so a
    // malformed grid fails the same way every time.
    neighbors: OnceLock<CacheResult<Vec<[u32; 3]>>>,
    descendants: OnceLock<CacheResult<Vec<Option<[u32; 4]>>>>,
    circumcenters: OnceLock<CacheResult<Vec<(Vec3, f64)>>>,
    vertex_triangles: OnceLock<CacheResult<Vec<Vec<Vec<u32>>>>>,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("grid_id", &self.grid_id)
            .field("nvertices", &self.vertices.len())
            .field("ntriangles", &self.triangles.len())
            .field("ntessellations", &self.tessellations.len())
            .finish()
    }
}

impl PartialEq for Grid {
    /// Grids are equal when their ids are: the id covers both tables.
    fn eq(&self, other: &Self) -> bool {
        self.grid_id == other.grid_id
    }
}

impl Grid {
    /// Build a grid from its tables. Validates unit vertices, triangle
    /// index bounds, and that the level spans partition the triangle
    /// table; computes the grid id.
    pub fn new(
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        tessellations: Vec<Vec<LevelSpan>>,
    ) -> Result<Self> {
        let grid_id = compute_grid_id(&vertices, &triangles);
        Self::from_parts(
            vertices,
            triangles,
            tessellations,
            format!("geotess-model {}", env!("CARGO_PKG_VERSION")),
            String::new(),
            String::new(),
            grid_id,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        tessellations: Vec<Vec<LevelSpan>>,
        software_version: String,
        generation_date: String,
        description: String,
        grid_id: String,
    ) -> Result<Self> {
        if tessellations.is_empty() || tessellations.iter().any(|t| t.is_empty()) {
            return Err(GeoTessError::inconsistent(
                "grid must define at least one tessellation with at least one level",
            ));
        }
        for &v in &vertices {
            if !v.is_unit() {
                return Err(GeoTessError::invalid_input(format!(
                    "vertex {} is not a unit vector",
                    v
                )));
            }
        }
        let nv = vertices.len() as u32;
        for (t, tri) in triangles.iter().enumerate() {
            if tri.iter().any(|&i| i >= nv) {
                return Err(GeoTessError::inconsistent(format!(
                    "triangle {} references a vertex beyond the vertex table",
                    t
                )));
            }
        }
        let span_total: usize = tessellations
            .iter()
            .flat_map(|levels| levels.iter())
            .map(LevelSpan::len)
            .sum();
        if span_total != triangles.len() {
            return Err(GeoTessError::inconsistent(format!(
                "level spans cover {} triangles but the table holds {}",
                span_total,
                triangles.len()
            )));
        }
        let mut level_offset = Vec::with_capacity(tessellations.len());
        let mut acc = 0usize;
        for levels in &tessellations {
            level_offset.push(acc);
            acc += levels.len();
        }
        Ok(Self {
            software_version,
            generation_date,
            description,
            grid_id,
            vertices,
            triangles,
            tessellations,
            level_offset,
            neighbors: OnceLock::new(),
            descendants: OnceLock::new(),
            circumcenters: OnceLock::new(),
            vertex_triangles: OnceLock::new(),
        })
    }

    pub fn grid_id(&self) -> &str {
        &self.grid_id
    }

    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    pub fn generation_date(&self) -> &str {
        &self.generation_date
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn nvertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, i: u32) -> Vec3 {
        self.vertices[i as usize]
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn ntriangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, t: u32) -> [u32; 3] {
        self.triangles[t as usize]
    }

    pub fn triangle_vertices(&self, t: u32) -> [Vec3; 3] {
        let [a, b, c] = self.triangles[t as usize];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn ntessellations(&self) -> usize {
        self.tessellations.len()
    }

    pub fn nlevels(&self, tess: usize) -> usize {
        self.tessellations[tess].len()
    }

    /// Index of the finest level of a tessellation.
    pub fn top_level(&self, tess: usize) -> usize {
        self.tessellations[tess].len() - 1
    }

    pub fn level_span(&self, tess: usize, level: usize) -> LevelSpan {
        self.tessellations[tess][level]
    }

    pub fn level_first_triangle(&self, tess: usize, level: usize) -> u32 {
        self.tessellations[tess][level].first
    }

    pub fn level_last_triangle(&self, tess: usize, level: usize) -> u32 {
        self.tessellations[tess][level].last
    }

    /// Flat cache index of (tess, level).
    fn global_level(&self, tess: usize, level: usize) -> usize {
        self.level_offset[tess] + level
    }

    /// The (tess, level) whose span contains triangle `t`.
    fn level_of(&self, t: u32) -> Option<(usize, usize)> {
        for (tess, levels) in self.tessellations.iter().enumerate() {
            for (level, span) in levels.iter().enumerate() {
                if span.contains(t) {
                    return Some((tess, level));
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Lazy caches
    // ------------------------------------------------------------------

    fn cache_err(msg: &str) -> GeoTessError {
        GeoTessError::inconsistent(msg.to_owned())
    }

    /// Per-triangle neighbors across the edge opposite each corner,
    /// within the triangle's own level.
    pub fn neighbors(&self) -> Result<&[[u32; 3]]> {
        self.neighbors
            .get_or_init(|| self.build_neighbors())
            .as_deref()
            .map_err(|e| Self::cache_err(e))
    }

    pub fn neighbor(&self, t: u32, k: usize) -> Result<u32> {
        Ok(self.neighbors()?[t as usize][k])
    }

    fn build_neighbors(&self) -> CacheResult<Vec<[u32; 3]>> {
        trace!("building neighbor table for grid {}", self.grid_id);
        let mut neighbors = vec![[u32::MAX; 3]; self.triangles.len()];
        for levels in &self.tessellations {
            for span in levels {
                // Map each undirected edge to the (triangle, corner)
                // pairs that own it; a closed level has exactly two.
                let mut edges: HashMap<(u32, u32), Vec<(u32, usize)>> =
                    HashMap::with_capacity(span.len() * 2);
                for t in span.first..=span.last {
                    let tri = self.triangles[t as usize];
                    for k in 0..3 {
                        let a = tri[(k + 1) % 3];
                        let b = tri[(k + 2) % 3];
                        let key = (a.min(b), a.max(b));
                        edges.entry(key).or_default().push((t, k));
                    }
                }
                for (key, owners) in edges {
                    if owners.len() != 2 {
                        return Err(format!(
                            "edge ({}, {}) is shared by {} triangles, expected 2",
                            key.0,
                            key.1,
                            owners.len()
                        ));
                    }
                    let (t0, k0) = owners[0];
                    let (t1, k1) = owners[1];
                    neighbors[t0 as usize][k0] = t1;
                    neighbors[t1 as usize][k1] = t0;
                }
            }
        }
        Ok(neighbors)
    }

    /// Per-triangle descendants: the four triangles at the next finer
    /// level of the same tessellation that tile it. `None` at the finest
    /// level.
    pub fn descendants(&self) -> Result<&[Option<[u32; 4]>]> {
        self.descendants
            .get_or_init(|| self.build_descendants())
            .as_deref()
            .map_err(|e| Self::cache_err(e))
    }

    pub fn descendant(&self, t: u32, k: usize) -> Result<Option<u32>> {
        Ok(self.descendants()?[t as usize].map(|d| d[k]))
    }

    fn build_descendants(&self) -> CacheResult<Vec<Option<[u32; 4]>>> {
        trace!("building descendant table for grid {}", self.grid_id);
        let mut desc: Vec<Option<[u32; 4]>> = vec![None; self.triangles.len()];
        let mut count = vec![0usize; self.triangles.len()];
        for (tess, levels) in self.tessellations.iter().enumerate() {
            for level in 0..levels.len().saturating_sub(1) {
                let parents = levels[level];
                let children = levels[level + 1];
                // Locate each child's center among the parents, walking
                // from the previously found parent for locality.
                let mut start = parents.first;
                for c in children.first..=children.last {
                    let [a, b, v2] = self.triangle_vertices(c);
                    let center = triangle_center(a, b, v2);
                    let p = self
                        .walk_within_level(start, center, self.level_span(tess, level))
                        .map_err(|e| e.to_string())?;
                    start = p;
                    let slot = desc[p as usize].get_or_insert([u32::MAX; 4]);
                    if count[p as usize] >= 4 {
                        return Err(format!(
                            "triangle {} has more than four descendants",
                            p
                        ));
                    }
                    slot[count[p as usize]] = c;
                    count[p as usize] += 1;
                }
                for p in parents.first..=parents.last {
                    if count[p as usize] != 4 {
                        return Err(format!(
                            "triangle {} has {} descendants, expected 4",
                            p, count[p as usize]
                        ));
                    }
                }
            }
        }
        Ok(desc)
    }

    /// Circumcenter of a triangle as a unit vector, with the cosine of
    /// its angular radius. The center satisfies `dot(cc, vi) = cos r` for
    /// all three corners.
    pub fn circumcenter(&self, t: u32) -> Result<(Vec3, f64)> {
        let cc = self
            .circumcenters
            .get_or_init(|| self.build_circumcenters())
            .as_deref()
            .map_err(|e| {
                GeoTessError::new(GeoTessErrorKind::GeometryDegenerate(e.to_owned()))
            })?;
        Ok(cc[t as usize])
    }

    fn build_circumcenters(&self) -> CacheResult<Vec<(Vec3, f64)>> {
        trace!("building circumcenters for grid {}", self.grid_id);
        let mut centers = Vec::with_capacity(self.triangles.len());
        for t in 0..self.triangles.len() as u32 {
            centers.push(circumcenter_of(self.triangle_vertices(t)).ok_or_else(|| {
                format!("triangle {} has colinear vertices", t)
            })?);
        }
        Ok(centers)
    }

    /// The triangles at (tess, level) that touch `vertex`, in cyclic
    /// order around it.
    pub fn vertex_triangles(&self, vertex: u32, tess: usize, level: usize) -> Result<&[u32]> {
        let cache = self
            .vertex_triangles
            .get_or_init(|| self.build_vertex_triangles())
            .as_ref()
            .map_err(|e| Self::cache_err(e))?;
        Ok(&cache[self.global_level(tess, level)][vertex as usize])
    }

    fn build_vertex_triangles(&self) -> CacheResult<Vec<Vec<Vec<u32>>>> {
        trace!("building vertex-triangle lists for grid {}", self.grid_id);
        let neighbors = self
            .neighbors
            .get_or_init(|| self.build_neighbors())
            .as_deref()
            .map_err(|e| e.clone())?;
        let total_levels: usize = self.tessellations.iter().map(Vec::len).sum();
        let mut lists = vec![vec![Vec::new(); self.vertices.len()]; total_levels];
        for (tess, levels) in self.tessellations.iter().enumerate() {
            for (level, span) in levels.iter().enumerate() {
                let g = self.global_level(tess, level);
                let by_vertex = &mut lists[g];
                for t in span.first..=span.last {
                    for &v in &self.triangles[t as usize] {
                        by_vertex[v as usize].push(t);
                    }
                }
                // Reorder each list cyclically: from a triangle holding
                // the vertex at corner c, the next one around is the
                // neighbor across the edge (vertex, corner c+1).
                for (v, list) in by_vertex.iter_mut().enumerate() {
                    if list.len() < 3 {
                        continue;
                    }
                    let start = list[0];
                    let mut ordered = Vec::with_capacity(list.len());
                    let mut t = start;
                    loop {
                        ordered.push(t);
                        let tri = self.triangles[t as usize];
                        let c = match tri.iter().position(|&x| x == v as u32) {
                            Some(c) => c,
                            None => return Err(format!(
                                "vertex-triangle list for vertex {} contains triangle {} that does not touch it",
                                v, t
                            )),
                        };
                        t = neighbors[t as usize][(c + 2) % 3];
                        if t == start || ordered.len() > list.len() {
                            break;
                        }
                    }
                    if ordered.len() != list.len() {
                        return Err(format!(
                            "triangles around vertex {} at level {} do not form a closed fan",
                            v, g
                        ));
                    }
                    *list = ordered;
                }
            }
        }
        Ok(lists)
    }

    // ------------------------------------------------------------------
    // Point location
    // ------------------------------------------------------------------

    /// Walk from `start` across same-level neighbors to the triangle
    /// containing unit vector `u`.
    ///
    /// A point `u` is inside edge (vi, vj) when the signed volume
    /// `det(vi, vj, u) >= 0`; the terminal triangle is the first whose
    /// three edge tests all pass. When more than one edge test fails the
    /// walk moves to the lowest-index neighbor, which makes the result
    /// deterministic for points exactly on an edge.
    pub fn walk_to_containing(&self, start: u32, u: Vec3) -> Result<u32> {
        if !u.is_unit() {
            return Err(GeoTessError::invalid_input(format!(
                "point {} is not a unit vector",
                u
            )));
        }
        let (tess, level) = self.level_of(start).ok_or_else(|| {
            GeoTessError::invalid_input(format!("triangle {} outside all level spans", start))
        })?;
        self.walk_within_level(start, u, self.level_span(tess, level))
    }

    fn walk_within_level(&self, start: u32, u: Vec3, span: LevelSpan) -> Result<u32> {
        let neighbors = self.neighbors()?;
        let mut t = start;
        // A walk on a closed sphere always terminates; the bound only
        // guards against a corrupt neighbor table.
        let limit = 4 * span.len() + 8;
        for _ in 0..limit {
            let verts = self.triangle_vertices(t);
            let mut next: Option<u32> = None;
            for k in 0..3 {
                let vi = verts[(k + 1) % 3];
                let vj = verts[(k + 2) % 3];
                if u.triple(vi, vj) < 0.0 {
                    let n = neighbors[t as usize][k];
                    next = Some(match next {
                        Some(m) => m.min(n),
                        None => n,
                    });
                }
            }
            match next {
                None => return Ok(t),
                Some(n) => t = n,
            }
        }
        Err(GeoTessError::inconsistent(format!(
            "triangle walk from {} did not terminate",
            start
        )))
    }

    /// Triangle at the finest level of `tess` containing `u`, by walking
    /// at the coarsest level and descending through descendants.
    pub fn top_level_triangle_containing(&self, u: Vec3, tess: usize) -> Result<u32> {
        self.locate(u, tess, self.top_level(tess), None)
    }

    /// Triangle at (tess, level) containing `u`.
    ///
    /// With a `hint` (a triangle at the target level, typically the
    /// result of a previous nearby query) the search is a pure
    /// neighbor-walk from the hint. Without one it walks at the coarsest
    /// level and descends: at each level the four descendants of the
    /// current triangle are scanned for containment.
    pub fn locate(&self, u: Vec3, tess: usize, level: usize, hint: Option<u32>) -> Result<u32> {
        if !u.is_unit() {
            return Err(GeoTessError::invalid_input(format!(
                "point {} is not a unit vector",
                u
            )));
        }
        if tess >= self.tessellations.len() || level >= self.nlevels(tess) {
            return Err(GeoTessError::invalid_input(format!(
                "tessellation {} level {} not defined",
                tess, level
            )));
        }
        let span = self.level_span(tess, level);
        if let Some(h) = hint {
            if span.contains(h) {
                return self.walk_within_level(h, u, span);
            }
        }
        let mut t = self.walk_within_level(self.level_first_triangle(tess, 0), u,
            self.level_span(tess, 0))?;
        for l in 0..level {
            let desc = self.descendants()?[t as usize].ok_or_else(|| {
                GeoTessError::inconsistent(format!(
                    "triangle {} at level {} has no descendants",
                    t, l
                ))
            })?;
            let mut found = None;
            for &d in &desc {
                let [a, b, c] = self.triangle_vertices(d);
                if triangle_contains(a, b, c, u) {
                    found = Some(d);
                    break;
                }
            }
            // Roundoff can leave an on-edge point outside every child by
            // a hair; a short walk at the child level recovers it.
            t = match found {
                Some(d) => d,
                None => self.walk_within_level(desc[0], u, self.level_span(tess, l + 1))?,
            };
        }
        Ok(t)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Structural validation, run after loading a grid from disk. Builds
    /// every lazy cache and checks the documented invariants.
    pub fn test_grid(&self) -> Result<()> {
        debug!("validating grid {}", self.grid_id);
        let neighbors = self.neighbors()?;
        // Neighbor symmetry at every triangle.
        for (t, nbrs) in neighbors.iter().enumerate() {
            for &n in nbrs {
                if n == u32::MAX {
                    return Err(GeoTessError::inconsistent(format!(
                        "triangle {} has a missing neighbor",
                        t
                    )));
                }
                if !neighbors[n as usize].contains(&(t as u32)) {
                    return Err(GeoTessError::inconsistent(format!(
                        "neighbor relation between triangles {} and {} is not symmetric",
                        t, n
                    )));
                }
            }
        }
        // Descendants tile their parents.
        let descendants = self.descendants()?;
        for (t, desc) in descendants.iter().enumerate() {
            if let Some(children) = desc {
                let [a, b, c] = self.triangle_vertices(t as u32);
                for &d in children {
                    let center = {
                        let [x, y, z] = self.triangle_vertices(d);
                        triangle_center(x, y, z)
                    };
                    if !triangle_contains(a, b, c, center) {
                        return Err(GeoTessError::inconsistent(format!(
                            "descendant {} does not lie inside triangle {}",
                            d, t
                        )));
                    }
                }
            }
        }
        // Circumcenters are equidistant from all three corners.
        for t in 0..self.triangles.len() as u32 {
            let (cc, cos_r) = self.circumcenter(t)?;
            for v in self.triangle_vertices(t) {
                if (cc.dot(v) - cos_r).abs() > 1e-9 {
                    return Err(GeoTessError::inconsistent(format!(
                        "circumcenter of triangle {} is not equidistant from its corners",
                        t
                    )));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn write_binary(&self, w: &mut BinWriter) -> Result<()> {
        w.write_magic(GRID_MAGIC)?;
        w.write_u32(GRID_FORMAT_VERSION)?;
        w.write_string(&self.software_version)?;
        w.write_string(&self.generation_date)?;
        w.write_string(&self.description)?;
        w.write_string(&self.grid_id)?;
        w.write_u32(self.tessellations.len() as u32)?;
        for levels in &self.tessellations {
            w.write_u32(levels.len() as u32)?;
            for span in levels {
                w.write_u32(span.first)?;
                w.write_u32(span.last)?;
            }
        }
        w.write_u32(self.vertices.len() as u32)?;
        for v in &self.vertices {
            w.write_f64(v.x)?;
            w.write_f64(v.y)?;
            w.write_f64(v.z)?;
        }
        w.write_u32(self.triangles.len() as u32)?;
        for tri in &self.triangles {
            for &i in tri {
                w.write_u32(i)?;
            }
        }
        Ok(())
    }

    pub fn read_binary(r: &mut BinReader) -> Result<Self> {
        r.expect_magic(GRID_MAGIC)?;
        let version = r.read_u32()?;
        if version != GRID_FORMAT_VERSION {
            return Err(GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!(
                    "unsupported grid format version {}",
                    version
                )),
                r.offset(),
            ));
        }
        let software_version = r.read_string()?;
        let generation_date = r.read_string()?;
        let description = r.read_string()?;
        let grid_id = r.read_string()?;
        let ntess = r.read_u32()? as usize;
        let mut tessellations = Vec::with_capacity(ntess);
        for _ in 0..ntess {
            let nlevels = r.read_u32()? as usize;
            let mut levels = Vec::with_capacity(nlevels);
            for _ in 0..nlevels {
                let first = r.read_u32()?;
                let last = r.read_u32()?;
                levels.push(LevelSpan { first, last });
            }
            tessellations.push(levels);
        }
        let nvertices = r.read_u32()? as usize;
        let mut vertices = Vec::with_capacity(nvertices);
        for _ in 0..nvertices {
            let x = r.read_f64()?;
            let y = r.read_f64()?;
            let z = r.read_f64()?;
            vertices.push(Vec3::new(x, y, z));
        }
        let ntriangles = r.read_u32()? as usize;
        let mut triangles = Vec::with_capacity(ntriangles);
        for _ in 0..ntriangles {
            triangles.push([r.read_u32()?, r.read_u32()?, r.read_u32()?]);
        }
        Self::finish_load(
            vertices,
            triangles,
            tessellations,
            software_version,
            generation_date,
            description,
            grid_id,
        )
    }

    pub fn write_ascii(&self, w: &mut AsciiWriter) -> Result<()> {
        w.write_line(GRID_MAGIC)?;
        w.write_line(&GRID_FORMAT_VERSION.to_string())?;
        w.write_string(&self.software_version)?;
        w.write_string(&self.generation_date)?;
        w.write_string(&self.description)?;
        w.write_line(&self.grid_id)?;
        w.write_line(&self.tessellations.len().to_string())?;
        for levels in &self.tessellations {
            w.write_line(&levels.len().to_string())?;
            for span in levels {
                w.write_fields(&[span.first.to_string(), span.last.to_string()])?;
            }
        }
        w.write_line(&self.vertices.len().to_string())?;
        for v in &self.vertices {
            w.write_fields(&[v.x.to_string(), v.y.to_string(), v.z.to_string()])?;
        }
        w.write_line(&self.triangles.len().to_string())?;
        for tri in &self.triangles {
            w.write_fields(&[tri[0].to_string(), tri[1].to_string(), tri[2].to_string()])?;
        }
        Ok(())
    }

    pub fn read_ascii(r: &mut AsciiReader) -> Result<Self> {
        let magic = r.read_word()?;
        if magic != GRID_MAGIC {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "bad magic {:?}",
                magic
            ))));
        }
        let version = r.read_u32()?;
        if version != GRID_FORMAT_VERSION {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "unsupported grid format version {}",
                version
            ))));
        }
        let software_version = r.read_string()?;
        let generation_date = r.read_string()?;
        let description = r.read_string()?;
        let grid_id = r.read_word()?;
        let ntess = r.read_u32()? as usize;
        let mut tessellations = Vec::with_capacity(ntess);
        for _ in 0..ntess {
            let nlevels = r.read_u32()? as usize;
            let mut levels = Vec::with_capacity(nlevels);
            for _ in 0..nlevels {
                levels.push(LevelSpan {
                    first: r.read_u32()?,
                    last: r.read_u32()?,
                });
            }
            tessellations.push(levels);
        }
        let nvertices = r.read_u32()? as usize;
        let mut vertices = Vec::with_capacity(nvertices);
        for _ in 0..nvertices {
            vertices.push(Vec3::new(r.read_f64()?, r.read_f64()?, r.read_f64()?));
        }
        let ntriangles = r.read_u32()? as usize;
        let mut triangles = Vec::with_capacity(ntriangles);
        for _ in 0..ntriangles {
            triangles.push([r.read_u32()?, r.read_u32()?, r.read_u32()?]);
        }
        Self::finish_load(
            vertices,
            triangles,
            tessellations,
            software_version,
            generation_date,
            description,
            grid_id,
        )
    }

    fn finish_load(
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        tessellations: Vec<Vec<LevelSpan>>,
        software_version: String,
        generation_date: String,
        description: String,
        grid_id: String,
    ) -> Result<Self> {
        let computed = compute_grid_id(&vertices, &triangles);
        if computed != grid_id {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "grid id {} does not match the digest of the tables ({})",
                grid_id, computed
            ))));
        }
        debug!(
            "loaded grid {}: {} vertices, {} triangles, {} tessellations",
            grid_id,
            vertices.len(),
            triangles.len(),
            tessellations.len()
        );
        Self::from_parts(
            vertices,
            triangles,
            tessellations,
            software_version,
            generation_date,
            description,
            grid_id,
        )
    }

    /// Load a grid from a file, sniffing binary vs ASCII from the header.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        if crate::io::is_ascii_header(&data, GRID_MAGIC) {
            Self::read_ascii(&mut AsciiReader::from_text(data))
        } else {
            let mut cur = data.as_slice();
            Self::read_binary(&mut BinReader::new(&mut cur))
        }
    }

    /// Write a grid to a file; a path ending in `.ascii` selects the
    /// ASCII format.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = std::fs::File::create(path)?;
        if crate::io::is_ascii_path(path) {
            let mut w = AsciiWriter::new(&mut file);
            self.write_ascii(&mut w)?;
            w.flush()
        } else {
            let mut w = BinWriter::new(&mut file);
            self.write_binary(&mut w)?;
            w.flush()
        }
    }

    // ------------------------------------------------------------------
    // Construction by refinement
    // ------------------------------------------------------------------

    /// Icosahedral tessellation with `nlevels` levels of uniform 4-to-1
    /// refinement (level 0 is the icosahedron's 20 faces).
    pub fn icosahedron(nlevels: usize) -> Result<Self> {
        Self::icosahedron_multi(&[nlevels])
    }

    /// Multi-tessellation icosahedral grid: one tessellation per entry,
    /// each refined to its own level count. Vertices are shared across
    /// tessellations, so coarse vertex sets are subsets of finer ones.
    pub fn icosahedron_multi(level_counts: &[usize]) -> Result<Self> {
        if level_counts.iter().any(|&n| n == 0) {
            return Err(GeoTessError::invalid_input(
                "every tessellation needs at least one level",
            ));
        }
        let mut vertices = base_icosahedron_vertices();
        let base = base_icosahedron_faces(&vertices);
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut triangles: Vec<[u32; 3]> = Vec::new();
        let mut tessellations = Vec::with_capacity(level_counts.len());
        for &nlevels in level_counts {
            let mut levels = Vec::with_capacity(nlevels);
            let mut current = base.clone();
            for level in 0..nlevels {
                let first = triangles.len() as u32;
                triangles.extend_from_slice(&current);
                levels.push(LevelSpan {
                    first,
                    last: triangles.len() as u32 - 1,
                });
                if level + 1 < nlevels {
                    current = subdivide(&current, &mut vertices, &mut midpoints);
                }
            }
            tessellations.push(levels);
        }
        Self::new(vertices, triangles, tessellations)
    }
}

/// MD5 digest over the canonical little-endian bytes of the vertex table
/// followed by the triangle table, as 32 uppercase hex characters.
pub fn compute_grid_id(vertices: &[Vec3], triangles: &[[u32; 3]]) -> String {
    let mut hasher = Md5::new();
    for v in vertices {
        hasher.update(v.x.to_le_bytes());
        hasher.update(v.y.to_le_bytes());
        hasher.update(v.z.to_le_bytes());
    }
    for tri in triangles {
        for &i in tri {
            hasher.update(i.to_le_bytes());
        }
    }
    use std::fmt::Write;
    let digest = hasher.finalize();
    let mut id = String::with_capacity(32);
    for b in digest {
        let _ = write!(id, "{:02X}", b);
    }
    id
}

/// Circumcenter of a spherical triangle: the normal of its plane, flipped
/// into the triangle's own hemisphere, with `cos r = dot(cc, v0)`.
/// `None` when the corners are colinear.
fn circumcenter_of([v0, v1, v2]: [Vec3; 3]) -> Option<(Vec3, f64)> {
    let cc = (v0 - v1).cross(v2 - v1).normalized()?;
    let cc = if cc.dot(v0 + v1 + v2) < 0.0 { -cc } else { cc };
    Some((cc, cc.dot(v0)))
}

fn base_icosahedron_vertices() -> Vec<Vec3> {
    let phi = (1.0 + 5f64.sqrt()) / 2.0;
    let raw = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];
    raw.iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalized().unwrap())
        .collect()
}

/// The 20 faces of the icosahedron, found from adjacency (neighboring
/// vertices subtend the same known angle) and oriented outward.
fn base_icosahedron_faces(vertices: &[Vec3]) -> Vec<[u32; 3]> {
    // Adjacent vertices of a unit icosahedron have dot = 1/sqrt(5).
    let threshold = 0.3;
    let n = vertices.len();
    let mut faces = Vec::with_capacity(20);
    for i in 0..n {
        for j in (i + 1)..n {
            if vertices[i].dot(vertices[j]) < threshold {
                continue;
            }
            for k in (j + 1)..n {
                if vertices[j].dot(vertices[k]) < threshold
                    || vertices[i].dot(vertices[k]) < threshold
                {
                    continue;
                }
                let (a, b, c) = (i as u32, j as u32, k as u32);
                // Outward orientation: positive signed volume.
                if vertices[i].triple(vertices[j], vertices[k]) > 0.0 {
                    faces.push([a, b, c]);
                } else {
                    faces.push([a, c, b]);
                }
            }
        }
    }
    debug_assert_eq!(faces.len(), 20);
    faces
}

/// One round of 4-to-1 refinement. Midpoint vertices are deduplicated
/// through `midpoints`, so repeated subdivision shares vertices and every
/// coarse vertex survives into the finer level.
fn subdivide(
    faces: &[[u32; 3]],
    vertices: &mut Vec<Vec3>,
    midpoints: &mut HashMap<(u32, u32), u32>,
) -> Vec<[u32; 3]> {
    let mut out = Vec::with_capacity(faces.len() * 4);
    for &[a, b, c] in faces {
        let ab = midpoint_index(a, b, vertices, midpoints);
        let bc = midpoint_index(b, c, vertices, midpoints);
        let ca = midpoint_index(c, a, vertices, midpoints);
        out.push([a, ab, ca]);
        out.push([ab, b, bc]);
        out.push([ca, bc, c]);
        out.push([ab, bc, ca]);
    }
    out
}

fn midpoint_index(
    a: u32,
    b: u32,
    vertices: &mut Vec<Vec3>,
    midpoints: &mut HashMap<(u32, u32), u32>,
) -> u32 {
    let key = (a.min(b), a.max(b));
    if let Some(&i) = midpoints.get(&key) {
        return i;
    }
    // Midpoint of two non-antipodal unit vectors always normalizes.
    let m = vertices[a as usize]
        .midpoint(vertices[b as usize])
        .expect("edge endpoints are never antipodal");
    let i = vertices.len() as u32;
    vertices.push(m);
    midpoints.insert(key, i);
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn icosahedron_counts_match_refinement() {
        let grid = Grid::icosahedron(3).unwrap();
        // 20 + 80 + 320 triangles; 12 + 30 + 120 vertices.
        assert_eq!(grid.ntriangles(), 420);
        assert_eq!(grid.nvertices(), 162);
        assert_eq!(grid.nlevels(0), 3);
        assert_eq!(grid.level_span(0, 0), LevelSpan { first: 0, last: 19 });
        assert_eq!(grid.level_span(0, 2), LevelSpan { first: 100, last: 419 });
        grid.test_grid().unwrap();
    }

    #[test]
    fn level_spans_partition_the_triangle_table() {
        let grid = Grid::icosahedron_multi(&[2, 3]).unwrap();
        let total: usize = (0..grid.ntessellations())
            .flat_map(|t| (0..grid.nlevels(t)).map(move |l| (t, l)))
            .map(|(t, l)| grid.level_span(t, l).len())
            .sum();
        assert_eq!(total, grid.ntriangles());
        grid.test_grid().unwrap();
    }

    #[test]
    fn every_triangle_has_three_symmetric_neighbors() {
        let grid = Grid::icosahedron(2).unwrap();
        let neighbors = grid.neighbors().unwrap();
        for t in 0..grid.ntriangles() {
            for k in 0..3 {
                let n = neighbors[t][k];
                assert_ne!(n, u32::MAX);
                assert!(neighbors[n as usize].contains(&(t as u32)));
            }
        }
    }

    #[test]
    fn circumcenters_are_equidistant_from_corners() {
        let grid = Grid::icosahedron(1).unwrap();
        for t in 0..grid.ntriangles() as u32 {
            let (cc, cos_r) = grid.circumcenter(t).unwrap();
            assert!(cc.is_unit());
            for v in grid.triangle_vertices(t) {
                assert_relative_eq!(cc.dot(v), cos_r, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn walk_finds_the_containing_triangle_from_any_start() {
        let grid = Grid::icosahedron(3).unwrap();
        let span = grid.level_span(0, 2);
        let targets = [
            Vec3::new(0.3, -0.5, 0.9).normalized().unwrap(),
            Vec3::new(-0.8, 0.1, -0.2).normalized().unwrap(),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        for u in targets {
            let found = grid.walk_to_containing(span.first, u).unwrap();
            let [a, b, c] = grid.triangle_vertices(found);
            assert!(triangle_contains(a, b, c, u));
            // Same result from the other end of the span.
            assert_eq!(grid.walk_to_containing(span.last, u).unwrap(), found);
        }
    }

    #[test]
    fn locate_descends_to_the_same_triangle_as_walking() {
        let grid = Grid::icosahedron(3).unwrap();
        let u = Vec3::new(0.1, 0.7, 0.7).normalized().unwrap();
        let by_descent = grid.top_level_triangle_containing(u, 0).unwrap();
        let by_walk = grid
            .walk_to_containing(grid.level_first_triangle(0, 2), u)
            .unwrap();
        let [a, b, c] = grid.triangle_vertices(by_descent);
        assert!(triangle_contains(a, b, c, u));
        assert_eq!(by_descent, by_walk);
    }

    #[test]
    fn vertex_triangle_fans_are_closed_cycles() {
        let grid = Grid::icosahedron(2).unwrap();
        let neighbors = grid.neighbors().unwrap();
        // Original icosahedron vertices have 5 triangles, midpoints 6.
        let fan = grid.vertex_triangles(0, 0, 1).unwrap();
        assert_eq!(fan.len(), 5);
        let fan6 = grid.vertex_triangles(12, 0, 1).unwrap();
        assert_eq!(fan6.len(), 6);
        // Consecutive fan entries are neighbors.
        for w in fan.windows(2) {
            assert!(neighbors[w[0] as usize].contains(&w[1]));
        }
        assert!(neighbors[fan[fan.len() - 1] as usize].contains(&fan[0]));
    }

    #[test]
    fn descendants_tile_their_parent() {
        let grid = Grid::icosahedron(2).unwrap();
        let descendants = grid.descendants().unwrap();
        for t in 0..20u32 {
            let children = descendants[t as usize].unwrap();
            let [a, b, c] = grid.triangle_vertices(t);
            for d in children {
                let [x, y, z] = grid.triangle_vertices(d);
                assert!(triangle_contains(a, b, c, triangle_center(x, y, z)));
            }
        }
        // Finest level has none.
        assert!(descendants[20].is_none());
    }

    #[test]
    fn grid_id_tracks_the_tables() {
        let g1 = Grid::icosahedron(1).unwrap();
        let g2 = Grid::icosahedron(1).unwrap();
        let g3 = Grid::icosahedron(2).unwrap();
        assert_eq!(g1.grid_id(), g2.grid_id());
        assert_ne!(g1.grid_id(), g3.grid_id());
        assert_eq!(g1.grid_id().len(), 32);
        assert!(g1
            .grid_id()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(g1, g2);
    }

    #[test]
    fn binary_round_trip_preserves_everything() {
        let grid = Grid::icosahedron_multi(&[1, 2]).unwrap();
        let mut buf = Vec::new();
        grid.write_binary(&mut BinWriter::new(&mut buf)).unwrap();
        let mut cur = buf.as_slice();
        let read = Grid::read_binary(&mut BinReader::new(&mut cur)).unwrap();
        assert_eq!(read.grid_id(), grid.grid_id());
        assert_eq!(read.ntriangles(), grid.ntriangles());
        assert_eq!(read.ntessellations(), 2);
        read.test_grid().unwrap();
    }

    #[test]
    fn ascii_round_trip_preserves_everything() {
        let grid = Grid::icosahedron(2).unwrap();
        let mut buf = Vec::new();
        grid.write_ascii(&mut AsciiWriter::new(&mut buf)).unwrap();
        let read = Grid::read_ascii(&mut AsciiReader::from_text(buf)).unwrap();
        assert_eq!(read.grid_id(), grid.grid_id());
        assert_eq!(read.nvertices(), grid.nvertices());
    }

    #[test]
    fn corrupt_grid_id_is_rejected() {
        let grid = Grid::icosahedron(1).unwrap();
        let mut buf = Vec::new();
        grid.write_ascii(&mut AsciiWriter::new(&mut buf)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let bad = text.replacen(grid.grid_id(), &"0".repeat(32), 1);
        let err = Grid::read_ascii(&mut AsciiReader::from_text(bad)).unwrap_err();
        assert!(matches!(err.kind, GeoTessErrorKind::MalformedFile(_)));
    }
}
