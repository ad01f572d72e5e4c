#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geom;

use std::fmt;
use std::sync::Arc;

use geom::{
    AngleTolerance, Barycentric, BuildQuality, BvhBuildOptions, MeshIndex, Point3,
    ProjectionResult, TriangleSet, Vec3, Winding,
};
use serde::Serialize;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    // A logger installed by the host takes precedence.
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[cfg(all(feature = "parallel", target_arch = "wasm32"))]
#[wasm_bindgen]
pub async fn initialize_parallel(worker_count: Option<u32>) -> Result<(), JsError> {
    let threads = worker_count
        .map(|count| count.max(1) as usize)
        .or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .ok()
        })
        .unwrap_or(1);

    wasm_bindgen_rayon::init_thread_pool(threads)
        .await
        .map_err(|err| JsError::new(&format!("kon rayon threadpool niet initialiseren: {err}")))
}

#[derive(Debug, Serialize)]
struct ProjectionExport {
    matched: bool,
    triangle_index: u32,
    point: [f64; 3],
    barycentric: [f64; 3],
    distance: f64,
}

impl From<&ProjectionResult> for ProjectionExport {
    fn from(result: &ProjectionResult) -> Self {
        Self {
            matched: result.is_match(),
            triangle_index: result.triangle_index_or_invalid(),
            point: result.point.to_array(),
            barycentric: result.barycentric.to_array(),
            distance: result.distance(),
        }
    }
}

/// Flat, per-point arrays; barycentrics and points hold three values per entry.
#[derive(Debug, Default, Serialize)]
struct BindingExport {
    triangle_indices: Vec<u32>,
    barycentrics: Vec<f64>,
    points: Vec<f64>,
    distances: Vec<f64>,
}

impl BindingExport {
    fn from_results(results: &[ProjectionResult]) -> Self {
        let mut export = Self {
            triangle_indices: Vec::with_capacity(results.len()),
            barycentrics: Vec::with_capacity(results.len() * 3),
            points: Vec::with_capacity(results.len() * 3),
            distances: Vec::with_capacity(results.len()),
        };
        for result in results {
            export.triangle_indices.push(result.triangle_index_or_invalid());
            export.barycentrics.extend_from_slice(&result.barycentric.to_array());
            export.points.extend_from_slice(&result.point.to_array());
            export.distances.push(result.distance());
        }
        export
    }
}

#[derive(Debug, Serialize)]
struct DiagnosticsExport {
    node_count: usize,
    leaf_count: usize,
    primitive_count: usize,
    depth: usize,
    min_leaf_size: usize,
    max_leaf_size: usize,
    avg_leaf_size: f64,
    sah_cost: f64,
    degenerate_triangle_count: usize,
    warnings: Vec<String>,
}

/// Public entry point for consumers.
#[wasm_bindgen]
pub struct ProjectionEngine {
    index: Option<Arc<MeshIndex>>,
    options: BvhBuildOptions,
    winding: Winding,
    tolerance: AngleTolerance,
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl ProjectionEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> ProjectionEngine {
        ProjectionEngine {
            index: None,
            options: BvhBuildOptions::default(),
            winding: Winding::CounterClockwise,
            tolerance: AngleTolerance::default(),
        }
    }

    /// Geeft terug of er een mesh geladen is.
    #[wasm_bindgen]
    pub fn is_loaded(&self) -> bool {
        self.index.is_some()
    }

    #[wasm_bindgen]
    pub fn triangle_count(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.triangles().len())
    }

    /// Kies de bouwkwaliteit: "low", "medium" of "high".
    /// Geldt voor de volgende `load_mesh`.
    #[wasm_bindgen]
    pub fn set_quality(&mut self, quality: &str) -> Result<(), JsValue> {
        self.options.quality = parse_quality(quality)
            .ok_or_else(|| js_error(&format!("onbekende bouwkwaliteit '{quality}'")))?;
        Ok(())
    }

    /// Draai de normaalrichting van alle driehoeken om.
    #[wasm_bindgen]
    pub fn set_clockwise_winding(&mut self, clockwise: bool) {
        self.winding = if clockwise {
            Winding::Clockwise
        } else {
            Winding::CounterClockwise
        };
    }

    /// Hoektolerantie in radialen; π of meer schakelt het normaalfilter uit.
    #[wasm_bindgen]
    pub fn set_angle_tolerance(&mut self, radians: f64) -> Result<(), JsValue> {
        self.tolerance = AngleTolerance::from_radians(radians).map_err(to_js_error)?;
        Ok(())
    }

    /// Laad een mesh als platte `[x, y, z, ...]` posities en driehoeksindices
    /// en bouw de hiërarchie.
    #[wasm_bindgen]
    pub fn load_mesh(&mut self, positions: Vec<f64>, indices: Vec<u32>) -> Result<(), JsValue> {
        let triangles = self.triangle_set(&positions, &indices)?;
        self.index = Some(Arc::new(MeshIndex::build(triangles, &self.options)));
        Ok(())
    }

    /// Laad een mesh samen met een eerder geserialiseerde hiërarchie.
    #[wasm_bindgen]
    pub fn load_mesh_with_bvh(
        &mut self,
        positions: Vec<f64>,
        indices: Vec<u32>,
        bvh_bytes: Vec<u8>,
    ) -> Result<(), JsValue> {
        let triangles = self.triangle_set(&positions, &indices)?;
        let bvh = geom::from_bytes(&bvh_bytes).map_err(to_js_error)?;
        let index = MeshIndex::from_parts(triangles, bvh).map_err(to_js_error)?;
        self.index = Some(Arc::new(index));
        Ok(())
    }

    #[wasm_bindgen]
    pub fn closest_point(
        &self,
        x: f64,
        y: f64,
        z: f64,
        nx: f64,
        ny: f64,
        nz: f64,
    ) -> Result<JsValue, JsValue> {
        let index = self.loaded()?;
        let result = index.closest_point(Point3::new(x, y, z), Vec3::new(nx, ny, nz), self.tolerance);
        serde_wasm_bindgen::to_value(&ProjectionExport::from(&result)).map_err(to_js_error)
    }

    /// Bind vele punten tegelijk; `points` en `normals` zijn platte xyz-lijsten.
    #[wasm_bindgen]
    pub fn bind_points(&self, points: Vec<f64>, normals: Vec<f64>) -> Result<JsValue, JsValue> {
        let index = self.loaded()?;
        let points: Vec<Point3> = triples(&points, "points")?
            .map(Point3::from_array)
            .collect();
        let normals: Vec<Vec3> = triples(&normals, "normals")?
            .map(Vec3::from_array)
            .collect();
        let results = index
            .bind_points(&points, &normals, self.tolerance)
            .map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&BindingExport::from_results(&results)).map_err(to_js_error)
    }

    /// Evalueer bindingen op een vervormde mesh met dezelfde topologie.
    /// Punten zonder geldige binding worden `NaN`.
    #[wasm_bindgen]
    pub fn evaluate_bindings(
        &self,
        triangle_indices: Vec<u32>,
        barycentrics: Vec<f64>,
        positions: Vec<f64>,
        indices: Vec<u32>,
    ) -> Result<Vec<f64>, JsValue> {
        if barycentrics.len() != triangle_indices.len() * 3 {
            return Err(js_error("verwacht drie barycentrische gewichten per binding"));
        }
        let positions: Vec<Point3> = triples(&positions, "positions")?
            .map(Point3::from_array)
            .collect();
        let bindings: Vec<ProjectionResult> = triangle_indices
            .iter()
            .zip(barycentrics.chunks_exact(3))
            .map(|(&triangle, weights)| ProjectionResult {
                triangle: (triangle != ProjectionResult::INVALID_INDEX).then_some(triangle as usize),
                barycentric: Barycentric::new(weights[0], weights[1], weights[2]),
                ..ProjectionResult::NO_MATCH
            })
            .collect();

        Ok(geom::evaluate_bindings(&bindings, &positions, &indices)
            .into_iter()
            .flat_map(|point| point.map_or([f64::NAN; 3], Point3::to_array))
            .collect())
    }

    /// Serialiseer de huidige hiërarchie naar bytes.
    #[wasm_bindgen]
    pub fn serialize_bvh(&self) -> Result<Vec<u8>, JsValue> {
        Ok(geom::to_bytes(self.loaded()?.bvh()))
    }

    #[wasm_bindgen]
    pub fn get_diagnostics(&self) -> Result<JsValue, JsValue> {
        let diag = self.loaded()?.diagnostics();
        serde_wasm_bindgen::to_value(&DiagnosticsExport {
            node_count: diag.node_count,
            leaf_count: diag.leaf_count,
            primitive_count: diag.primitive_count,
            depth: diag.depth,
            min_leaf_size: diag.min_leaf_size,
            max_leaf_size: diag.max_leaf_size,
            avg_leaf_size: diag.avg_leaf_size,
            sah_cost: diag.sah_cost,
            degenerate_triangle_count: diag.degenerate_triangle_count,
            warnings: diag.warnings,
        })
        .map_err(to_js_error)
    }
}

impl ProjectionEngine {
    /// Shared handle to the current index; stays valid after a reload.
    #[must_use]
    pub fn index(&self) -> Option<Arc<MeshIndex>> {
        self.index.clone()
    }

    fn loaded(&self) -> Result<&MeshIndex, JsValue> {
        self.index
            .as_deref()
            .ok_or_else(|| js_error("geen mesh geladen"))
    }

    fn triangle_set(&self, positions: &[f64], indices: &[u32]) -> Result<TriangleSet, JsValue> {
        let positions: Vec<Point3> = triples(positions, "positions")?
            .map(Point3::from_array)
            .collect();
        TriangleSet::from_indexed(&positions, indices, self.winding).map_err(to_js_error)
    }
}

fn parse_quality(name: &str) -> Option<BuildQuality> {
    match name.trim().to_ascii_lowercase().as_str() {
        "low" => Some(BuildQuality::Low),
        "medium" => Some(BuildQuality::Medium),
        "high" => Some(BuildQuality::High),
        _ => None,
    }
}

fn triples<'a>(
    values: &'a [f64],
    what: &'static str,
) -> Result<impl Iterator<Item = [f64; 3]> + 'a, JsValue> {
    if values.len() % 3 != 0 {
        return Err(js_error(&format!(
            "lengte van {what} ({}) is geen veelvoud van 3",
            values.len()
        )));
    }
    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]))
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality(" High "), Some(BuildQuality::High));
        assert_eq!(parse_quality("low"), Some(BuildQuality::Low));
        assert_eq!(parse_quality("ultra"), None);
    }

    #[test]
    fn test_engine_loads_and_reloads() {
        let mut engine = ProjectionEngine::new();
        assert!(!engine.is_loaded());
        engine
            .load_mesh(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], vec![0, 1, 2])
            .unwrap();
        let first = engine.index().unwrap();
        assert_eq!(engine.triangle_count(), 1);

        engine
            .load_mesh(
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
                vec![0, 1, 2, 1, 3, 2],
            )
            .unwrap();
        assert_eq!(engine.triangle_count(), 2);
        // The previous index is still usable by whoever holds it.
        assert_eq!(first.triangles().len(), 1);
    }

    #[test]
    fn test_engine_bvh_round_trip() {
        let positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let indices = vec![0, 1, 2, 1, 3, 2];
        let mut engine = ProjectionEngine::new();
        engine.load_mesh(positions.clone(), indices.clone()).unwrap();
        let bytes = engine.serialize_bvh().unwrap();

        let mut restored = ProjectionEngine::new();
        restored.load_mesh_with_bvh(positions, indices, bytes).unwrap();
        assert_eq!(
            restored.index().unwrap().bvh(),
            engine.index().unwrap().bvh()
        );
    }

    #[test]
    fn test_evaluate_bindings_marks_unmatched() {
        let engine = ProjectionEngine::new();
        let out = engine
            .evaluate_bindings(
                vec![0, ProjectionResult::INVALID_INDEX],
                vec![0.5, 0.25, 0.25, 0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0],
                vec![0, 1, 2],
            )
            .unwrap();
        assert_eq!(&out[..3], &[0.5, 0.5, 0.0]);
        assert!(out[3..].iter().all(|v| v.is_nan()));
    }
}
