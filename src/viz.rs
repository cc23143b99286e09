//! Render legends and choropleth previews to **SVG** or **PNG**.
//!
//! The backend is picked from the output extension (`.svg`, anything else is a bitmap).
//! Plotters' pure-Rust text path does not discover OS fonts, so labels are only drawn
//! after a font has been registered with [`register_label_font`]; without one the
//! output contains shapes only.

use crate::color::Rgb8;
use crate::legend::Legend;
use crate::models::Feature;
use crate::paint::PaintStyle;
use anyhow::{Result, anyhow};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontFamily;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_bitmap::BitMapBackend;
use plotters_svg::SVGBackend;
use std::path::Path;
use std::sync::OnceLock;

static LABEL_FONT: OnceLock<()> = OnceLock::new();

/// Register a TrueType/OpenType font as `sans-serif` for all later renders.
///
/// Only the first successful registration takes effect.
pub fn register_label_font(bytes: Vec<u8>) -> Result<()> {
    if LABEL_FONT.get().is_some() {
        return Ok(());
    }
    // plotters keeps a 'static reference to registered font data
    let data: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    plotters::style::register_font("sans-serif", plotters::style::FontStyle::Normal, data)
        .map_err(|_| anyhow!("not a usable TrueType/OpenType font"))?;
    let _ = LABEL_FONT.set(());
    Ok(())
}

pub fn labels_enabled() -> bool {
    LABEL_FONT.get().is_some()
}

fn rgb(c: Rgb8) -> RGBColor {
    RGBColor(c.r, c.g, c.b)
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("svg"))
        .unwrap_or(false)
}

/// Draw `legend` as a vertical list of swatches.
pub fn render_legend<P: AsRef<Path>>(legend: &Legend, out_path: P, width: u32, height: u32) -> Result<()> {
    if legend.is_empty() {
        return Err(anyhow!("legend has no entries"));
    }
    let out_path = out_path.as_ref();
    let path_string = out_path.to_string_lossy().into_owned();
    if is_svg(out_path) {
        let root = SVGBackend::new(path_string.as_str(), (width, height)).into_drawing_area();
        draw_legend(root, legend)
    } else {
        let root = BitMapBackend::new(path_string.as_str(), (width, height)).into_drawing_area();
        draw_legend(root, legend)
    }
}

fn draw_legend<DB: DrawingBackend>(root: DrawingArea<DB, Shift>, legend: &Legend) -> Result<()> {
    root.fill(&WHITE).map_err(|e| anyhow!("{:?}", e))?;

    const PAD: i32 = 10;
    const SWATCH_W: i32 = 24;
    const SWATCH_H: i32 = 16;
    const ROW_GAP: i32 = 6;
    let font_px: u32 = 13;
    let text = labels_enabled();
    let label_style = TextStyle::from((FontFamily::SansSerif, font_px))
        .pos(Pos::new(HPos::Left, VPos::Center));

    let mut y = PAD;
    if text && !legend.title.is_empty() {
        let title_style = TextStyle::from((FontFamily::SansSerif, font_px + 2))
            .pos(Pos::new(HPos::Left, VPos::Top));
        root.draw(&Text::new(legend.title.as_str(), (PAD, y), title_style))
            .map_err(|e| anyhow!("{:?}", e))?;
        y += font_px as i32 + 12;
    }

    let rows = legend
        .entries
        .iter()
        .map(|e| (e.color, e.label.as_str()))
        .chain(std::iter::once((legend.no_data, "No data")));
    for (color, label) in rows {
        root.draw(&Rectangle::new(
            [(PAD, y), (PAD + SWATCH_W, y + SWATCH_H)],
            rgb(color).filled(),
        ))
        .map_err(|e| anyhow!("{:?}", e))?;
        root.draw(&Rectangle::new(
            [(PAD, y), (PAD + SWATCH_W, y + SWATCH_H)],
            BLACK.mix(0.4).stroke_width(1),
        ))
        .map_err(|e| anyhow!("{:?}", e))?;
        if text {
            root.draw(&Text::new(
                label,
                (PAD + SWATCH_W + 8, y + SWATCH_H / 2),
                label_style.clone(),
            ))
            .map_err(|e| anyhow!("{:?}", e))?;
        }
        y += SWATCH_H + ROW_GAP;
    }

    root.present().map_err(|e| anyhow!("{:?}", e))?;
    Ok(())
}

/// Longitude/latitude extent of a set of features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of(features: &[Feature]) -> Option<Bounds> {
        let mut b: Option<Bounds> = None;
        for f in features {
            let Some(geom) = &f.geometry else { continue };
            for_each_position(&geom.value, &mut |p: &[f64]| {
                let (x, y) = (p[0], p[1]);
                b = Some(match b {
                    None => Bounds {
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    },
                    Some(o) => Bounds {
                        min_x: o.min_x.min(x),
                        min_y: o.min_y.min(y),
                        max_x: o.max_x.max(x),
                        max_y: o.max_y.max(y),
                    },
                });
            });
        }
        b
    }
}

fn for_each_position(value: &geojson::Value, f: &mut impl FnMut(&[f64])) {
    use geojson::Value as G;
    let mut visit = |p: &Vec<f64>| {
        if p.len() >= 2 {
            f(p.as_slice())
        }
    };
    match value {
        G::Point(p) => visit(p),
        G::MultiPoint(ps) | G::LineString(ps) => ps.iter().for_each(visit),
        G::MultiLineString(ls) | G::Polygon(ls) => ls.iter().flatten().for_each(visit),
        G::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(visit),
        G::GeometryCollection(gs) => {
            for g in gs {
                for_each_position(&g.value, f);
            }
        }
    }
}

/// Equirectangular projection of `bounds` into a pixel box, aspect ratio kept.
struct Projection {
    bounds: Bounds,
    scale: f64,
    offset: (f64, f64),
}

impl Projection {
    fn new(bounds: Bounds, width: u32, height: u32, pad: f64) -> Self {
        let dx = (bounds.max_x - bounds.min_x).max(1e-9);
        let dy = (bounds.max_y - bounds.min_y).max(1e-9);
        let avail_w = (width as f64 - 2.0 * pad).max(1.0);
        let avail_h = (height as f64 - 2.0 * pad).max(1.0);
        let scale = (avail_w / dx).min(avail_h / dy);
        let offset = (
            pad + (avail_w - dx * scale) / 2.0,
            pad + (avail_h - dy * scale) / 2.0,
        );
        Self {
            bounds,
            scale,
            offset,
        }
    }

    fn px(&self, p: &[f64]) -> (i32, i32) {
        let x = self.offset.0 + (p[0] - self.bounds.min_x) * self.scale;
        let y = self.offset.1 + (self.bounds.max_y - p[1]) * self.scale;
        (x.round() as i32, y.round() as i32)
    }
}

/// Draw every feature with its style: polygons filled, points as sized circles.
///
/// `zoom` selects the circle radius tier, as on the live map.
pub fn render_map<P: AsRef<Path>>(
    features: &[Feature],
    style: &PaintStyle,
    out_path: P,
    width: u32,
    height: u32,
    zoom: f64,
) -> Result<()> {
    let bounds = Bounds::of(features).ok_or_else(|| anyhow!("no geometry to draw"))?;
    let proj = Projection::new(bounds, width, height, 12.0);
    let out_path = out_path.as_ref();
    let path_string = out_path.to_string_lossy().into_owned();
    if is_svg(out_path) {
        let root = SVGBackend::new(path_string.as_str(), (width, height)).into_drawing_area();
        draw_map(root, features, style, &proj, zoom)
    } else {
        let root = BitMapBackend::new(path_string.as_str(), (width, height)).into_drawing_area();
        draw_map(root, features, style, &proj, zoom)
    }
}

fn draw_map<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    features: &[Feature],
    style: &PaintStyle,
    proj: &Projection,
    zoom: f64,
) -> Result<()> {
    root.fill(&WHITE).map_err(|e| anyhow!("{:?}", e))?;

    for f in features {
        let Some(geom) = &f.geometry else { continue };
        // hidden layers still show their outlines
        let fill = style.color_of(f).map(rgb);
        let mut rings: Vec<&Vec<Vec<f64>>> = Vec::new();
        let mut points: Vec<&Vec<f64>> = Vec::new();
        collect_shapes(&geom.value, &mut rings, &mut points);

        for ring in rings {
            let px: Vec<(i32, i32)> = ring.iter().filter(|p| p.len() >= 2).map(|p| proj.px(p)).collect();
            if px.len() < 3 {
                continue;
            }
            if let Some(color) = fill {
                root.draw(&Polygon::new(px.clone(), color.filled()))
                    .map_err(|e| anyhow!("{:?}", e))?;
            }
            let mut closed = px;
            closed.push(closed[0]);
            let stroke = if fill.is_some() {
                WHITE.stroke_width(1)
            } else {
                RGBColor(180, 180, 180).stroke_width(1)
            };
            root.draw(&PathElement::new(closed, stroke))
                .map_err(|e| anyhow!("{:?}", e))?;
        }

        let radius = style.radius_of(f, zoom);
        if let Some(color) = fill.filter(|_| radius > 0.0) {
            for p in points {
                let center = proj.px(p);
                let r = radius.round().max(1.0) as i32;
                root.draw(&Circle::new(center, r, color.filled()))
                    .map_err(|e| anyhow!("{:?}", e))?;
                root.draw(&Circle::new(center, r, BLACK.stroke_width(1)))
                    .map_err(|e| anyhow!("{:?}", e))?;
            }
        }
    }

    root.present().map_err(|e| anyhow!("{:?}", e))?;
    Ok(())
}

// Outer rings only; holes are not cut out in the preview.
fn collect_shapes<'a>(
    value: &'a geojson::Value,
    rings: &mut Vec<&'a Vec<Vec<f64>>>,
    points: &mut Vec<&'a Vec<f64>>,
) {
    use geojson::Value as G;
    match value {
        G::Point(p) => points.push(p),
        G::MultiPoint(ps) => points.extend(ps.iter()),
        G::Polygon(poly) => rings.extend(poly.first()),
        G::MultiPolygon(polys) => rings.extend(polys.iter().filter_map(|poly| poly.first())),
        G::GeometryCollection(gs) => {
            for g in gs {
                collect_shapes(&g.value, rings, points);
            }
        }
        G::LineString(_) | G::MultiLineString(_) => {}
    }
}
