//! Extraction commands
//!
//! Each command maps directly onto the library's query surface: build a
//! Position over the loaded model, sweep it across the requested
//! geometry, and print whitespace-separated records to stdout.

use std::error::Error;

use log::debug;
use num_traits::clamp;

use geotess_geom::GreatCircle;
use geotess_interp::Position;
use geotess_model::Model;

use crate::{Interp, Window};

type CmdResult = Result<(), Box<dyn Error>>;

/// Resolve a layer given as an index or a layer name.
fn resolve_layer(model: &Model, spec: &str) -> Result<usize, Box<dyn Error>> {
    if let Ok(idx) = spec.parse::<usize>() {
        if idx >= model.nlayers() {
            return Err(format!(
                "layer {} out of range, model has {} layers",
                idx,
                model.nlayers()
            )
            .into());
        }
        return Ok(idx);
    }
    model
        .metadata()
        .layer_index(spec)
        .ok_or_else(|| format!("no layer named {:?}", spec).into())
}

/// Attribute indices to report: the explicit list, or all of them.
fn resolve_attributes(model: &Model, requested: &[usize]) -> Result<Vec<usize>, Box<dyn Error>> {
    if requested.is_empty() {
        return Ok((0..model.nattributes()).collect());
    }
    for &a in requested {
        if a >= model.nattributes() {
            return Err(format!(
                "attribute {} out of range, model has {}",
                a,
                model.nattributes()
            )
            .into());
        }
    }
    Ok(requested.to_vec())
}

fn linspace(first: f64, last: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![first];
    }
    let step = (last - first) / (n - 1) as f64;
    (0..n).map(|i| first + step * i as f64).collect()
}

pub fn info(model: &Model) -> CmdResult {
    let meta = model.metadata();
    let grid = model.grid();
    println!("model software version: {}", meta.model_software_version());
    println!("model generation date:  {}", meta.model_generation_date());
    println!("earth shape:            {}", meta.earth_shape());
    println!("data type:              {}", meta.data_type());
    println!("description:");
    for line in meta.description().lines() {
        println!("  {}", line);
    }
    println!("layers ({}):", meta.nlayers());
    for (i, name) in meta.layer_names().iter().enumerate() {
        println!("  {:3} {} (tessellation {})", i, name, meta.tessellation_of(i));
    }
    println!("attributes ({}):", meta.nattributes());
    for (name, unit) in meta
        .attribute_names()
        .iter()
        .zip(meta.attribute_units())
    {
        println!("  {} [{}]", name, unit);
    }
    println!("grid id:                {}", grid.grid_id());
    println!("grid vertices:          {}", grid.nvertices());
    println!("grid triangles:         {}", grid.ntriangles());
    println!("tessellations:          {}", grid.ntessellations());
    for t in 0..grid.ntessellations() {
        let levels: Vec<String> = (0..grid.nlevels(t))
            .map(|l| grid.level_span(t, l).len().to_string())
            .collect();
        println!("  {:3} levels: {}", t, levels.join(" "));
    }
    println!("points:                 {}", model.npoints());
    Ok(())
}

pub fn map_values_depth(
    model: &Model,
    depth: f64,
    window: &Window,
    interp: &Interp,
    attributes: &[usize],
) -> CmdResult {
    let attrs = resolve_attributes(model, attributes)?;
    let shape = model.metadata().earth_shape();
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    debug!(
        "sampling {} x {} window at depth {} km",
        window.nlat, window.nlon, depth
    );
    for lat in linspace(window.lat_first, window.lat_last, window.nlat) {
        for lon in linspace(window.lon_first, window.lon_last, window.nlon) {
            let u = shape.unit_vector_degrees(lat, lon);
            pos.set_at_radius(u, shape.radius_at(u) - depth)?;
            print!("{:10.5} {:10.5}", lon, lat);
            for &a in &attrs {
                print!(" {}", pos.get_value(a)?);
            }
            println!();
        }
    }
    Ok(())
}

pub fn map_values_layer(
    model: &Model,
    layer_spec: &str,
    fraction: f64,
    window: &Window,
    interp: &Interp,
    attributes: &[usize],
) -> CmdResult {
    let layer = resolve_layer(model, layer_spec)?;
    let attrs = resolve_attributes(model, attributes)?;
    let fraction = clamp(fraction, 0.0, 1.0);
    let shape = model.metadata().earth_shape();
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    for lat in linspace(window.lat_first, window.lat_last, window.nlat) {
        for lon in linspace(window.lon_first, window.lon_last, window.nlon) {
            let u = shape.unit_vector_degrees(lat, lon);
            pos.set_bottom(layer, u)?;
            let bottom = pos.radius()?;
            pos.set_top(layer, u)?;
            let top = pos.radius()?;
            pos.set(layer, u, bottom + fraction * (top - bottom))?;
            print!("{:10.5} {:10.5}", lon, lat);
            for &a in &attrs {
                print!(" {}", pos.get_value(a)?);
            }
            println!();
        }
    }
    Ok(())
}

pub fn map_layer_boundary(
    model: &Model,
    layer_spec: &str,
    top: bool,
    as_depth: bool,
    window: &Window,
    interp: &Interp,
) -> CmdResult {
    let layer = resolve_layer(model, layer_spec)?;
    let shape = model.metadata().earth_shape();
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    for lat in linspace(window.lat_first, window.lat_last, window.nlat) {
        for lon in linspace(window.lon_first, window.lon_last, window.nlon) {
            let u = shape.unit_vector_degrees(lat, lon);
            if top {
                pos.set_top(layer, u)?;
            } else {
                pos.set_bottom(layer, u)?;
            }
            let value = if as_depth {
                pos.depth()?
            } else {
                pos.radius()?
            };
            println!("{:10.5} {:10.5} {}", lon, lat, value);
        }
    }
    Ok(())
}

pub fn map_layer_thickness(
    model: &Model,
    layer_spec: &str,
    window: &Window,
    interp: &Interp,
) -> CmdResult {
    let layer = resolve_layer(model, layer_spec)?;
    let shape = model.metadata().earth_shape();
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    for lat in linspace(window.lat_first, window.lat_last, window.nlat) {
        for lon in linspace(window.lon_first, window.lon_last, window.nlon) {
            let u = shape.unit_vector_degrees(lat, lon);
            pos.set_bottom(layer, u)?;
            let bottom = pos.radius()?;
            pos.set_top(layer, u)?;
            let top = pos.radius()?;
            println!("{:10.5} {:10.5} {}", lon, lat, top - bottom);
        }
    }
    Ok(())
}

pub fn values_3d_block(
    model: &Model,
    window: &Window,
    depth_first: f64,
    depth_last: f64,
    ndepth: usize,
    interp: &Interp,
    attributes: &[usize],
) -> CmdResult {
    let attrs = resolve_attributes(model, attributes)?;
    let shape = model.metadata().earth_shape();
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    for lat in linspace(window.lat_first, window.lat_last, window.nlat) {
        for lon in linspace(window.lon_first, window.lon_last, window.nlon) {
            let u = shape.unit_vector_degrees(lat, lon);
            let surface = shape.radius_at(u);
            for depth in linspace(depth_first, depth_last, ndepth) {
                pos.set_at_radius(u, surface - depth)?;
                print!("{:10.5} {:10.5} {:10.3}", lon, lat, depth);
                for &a in &attrs {
                    print!(" {}", pos.get_value(a)?);
                }
                println!();
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn slice(
    model: &Model,
    first: (f64, f64),
    last: (f64, f64),
    npoints: usize,
    depth_first: f64,
    depth_last: f64,
    ndepth: usize,
    interp: &Interp,
    attributes: &[usize],
) -> CmdResult {
    let attrs = resolve_attributes(model, attributes)?;
    let shape = model.metadata().earth_shape();
    let a = shape.unit_vector_degrees(first.0, first.1);
    let b = shape.unit_vector_degrees(last.0, last.1);
    let gc = GreatCircle::new(a, b)
        .ok_or("slice endpoints are identical or antipodal")?;
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    for i in 0..npoints.max(2) {
        let f = i as f64 / (npoints.max(2) - 1) as f64;
        let u = gc.fraction(f);
        let distance = (gc.distance() * f).to_degrees();
        let surface = shape.radius_at(u);
        for depth in linspace(depth_first, depth_last, ndepth) {
            pos.set_at_radius(u, surface - depth)?;
            print!("{:10.5} {:10.3}", distance, depth);
            for &at in &attrs {
                print!(" {}", pos.get_value(at)?);
            }
            println!();
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn borehole(
    model: &Model,
    lat: f64,
    lon: f64,
    max_spacing: f64,
    first_layer: Option<&str>,
    last_layer: Option<&str>,
    interp: &Interp,
    attributes: &[usize],
) -> CmdResult {
    let attrs = resolve_attributes(model, attributes)?;
    let first = match first_layer {
        Some(s) => resolve_layer(model, s)?,
        None => 0,
    };
    let last = match last_layer {
        Some(s) => resolve_layer(model, s)?,
        None => model.nlayers() - 1,
    };
    if first > last {
        return Err("first layer is above last layer".into());
    }
    if !(max_spacing > 0.0) {
        return Err("max spacing must be positive".into());
    }
    let shape = model.metadata().earth_shape();
    let u = shape.unit_vector_degrees(lat, lon);
    let surface = shape.radius_at(u);
    let mut pos = Position::new(model, interp.horizontal(), interp.radial());
    // Deep to shallow, each layer sampled at most max_spacing apart,
    // with both boundaries always included.
    for layer in first..=last {
        pos.set_bottom(layer, u)?;
        let bottom = pos.radius()?;
        pos.set_top(layer, u)?;
        let top = pos.radius()?;
        let n = ((top - bottom) / max_spacing).ceil().max(1.0) as usize;
        for r in linspace(bottom, top, n + 1) {
            pos.set(layer, u, r)?;
            print!("{:10.3} {:10.3}", surface - r, r);
            for &a in &attrs {
                print!(" {}", pos.get_value(a)?);
            }
            println!();
        }
    }
    Ok(())
}
