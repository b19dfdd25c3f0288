// Reference CPU distance-field backend.
//
// Curves are flattened into polylines; each original segment stays one edge
// so multi-channel coloring can tell corners from smooth joints. Single
// channel modes take their sign from the nonzero winding rule. Each MSDF
// channel takes the signed pseudo distance of the nearest edge of its color.

use rtsdf_core::{
    ChannelMode, DistanceField, DistanceFieldBackend, FieldParams, GenerateError, Outline, Point,
    Segment,
};

use crate::config::FieldConfig;

const RED: u8 = 0b001;
const GREEN: u8 = 0b010;
const BLUE: u8 = 0b100;
const WHITE: u8 = RED | GREEN | BLUE;
const COLOR_CYCLE: [u8; 3] = [GREEN | BLUE, RED | BLUE, RED | GREEN];
/// Edges closer than this are equally near; the more orthogonal one wins.
const TIE_EPSILON: f32 = 1e-4;

struct Edge {
    points: Vec<Point>,
    start_dir: Point,
    end_dir: Point,
    color: u8,
}

#[derive(Clone, Copy)]
struct EdgeDistance {
    distance: f32,
    pseudo: f32,
    /// Pseudo distance, positive left of the edge direction.
    side_pseudo: f32,
    /// |sin| of the angle between the edge and the way to `p` at the closest point.
    ortho: f32,
}

impl EdgeDistance {
    fn closer_than(&self, other: &EdgeDistance) -> bool {
        if (self.distance - other.distance).abs() <= TIE_EPSILON {
            self.ortho > other.ortho
        } else {
            self.distance < other.distance
        }
    }
}

pub struct SegmentFieldBackend {
    corner_cross_threshold: f32,
    coloring_seed: u64,
    subdivisions: u32,
}

impl Default for SegmentFieldBackend {
    fn default() -> Self {
        Self::new(&FieldConfig::default())
    }
}

impl SegmentFieldBackend {
    pub fn new(config: &FieldConfig) -> Self {
        Self {
            corner_cross_threshold: config.corner_angle_threshold.sin().abs(),
            coloring_seed: config.coloring_seed,
            subdivisions: config.curve_subdivisions.max(1),
        }
    }

    fn build_edges(&self, outline: &Outline) -> Vec<Edge> {
        let mut edges = Vec::new();
        for contour in &outline.contours {
            let mut contour_edges: Vec<Edge> = contour
                .segments
                .iter()
                .filter_map(|segment| self.flatten(segment))
                .collect();
            self.color_contour(&mut contour_edges);
            edges.extend(contour_edges);
        }
        edges
    }

    fn flatten(&self, segment: &Segment) -> Option<Edge> {
        let n = self.subdivisions;
        let points: Vec<Point> = match *segment {
            Segment::Line(a, b) => vec![a, b],
            Segment::Quad(a, c, b) => (0..=n)
                .map(|i| {
                    let t = i as f32 / n as f32;
                    let mt = 1.0 - t;
                    Point::new(
                        mt * mt * a.x + 2.0 * mt * t * c.x + t * t * b.x,
                        mt * mt * a.y + 2.0 * mt * t * c.y + t * t * b.y,
                    )
                })
                .collect(),
            Segment::Cubic(a, c0, c1, b) => (0..=n)
                .map(|i| {
                    let t = i as f32 / n as f32;
                    let mt = 1.0 - t;
                    let (w0, w1, w2, w3) =
                        (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
                    Point::new(
                        w0 * a.x + w1 * c0.x + w2 * c1.x + w3 * b.x,
                        w0 * a.y + w1 * c0.y + w2 * c1.y + w3 * b.y,
                    )
                })
                .collect(),
        };

        let (start_dir, end_dir) = tangents(segment);
        if length(start_dir) == 0.0 || length(end_dir) == 0.0 {
            return None;
        }
        Some(Edge {
            points,
            start_dir: normalize(start_dir),
            end_dir: normalize(end_dir),
            color: WHITE,
        })
    }

    fn is_corner(&self, incoming: Point, outgoing: Point) -> bool {
        dot(incoming, outgoing) <= 0.0
            || cross(incoming, outgoing).abs() > self.corner_cross_threshold
    }

    /// Split the contour into splines at its corners and cycle colors so that
    /// neighbouring splines never share all channels.
    fn color_contour(&self, edges: &mut [Edge]) {
        let n = edges.len();
        if n == 0 {
            return;
        }
        let corners: Vec<usize> = (0..n)
            .filter(|&i| {
                let prev = (i + n - 1) % n;
                self.is_corner(edges[prev].end_dir, edges[i].start_dir)
            })
            .collect();

        let seed = (self.coloring_seed % 3) as usize;
        match corners.len() {
            0 => {
                for edge in edges.iter_mut() {
                    edge.color = WHITE;
                }
            }
            1 => {
                // Teardrop: one corner, split its edges into three runs.
                if n < 3 {
                    for edge in edges.iter_mut() {
                        edge.color = WHITE;
                    }
                    return;
                }
                let runs = [COLOR_CYCLE[seed], WHITE, COLOR_CYCLE[(seed + 1) % 3]];
                let start = corners[0];
                for j in 0..n {
                    edges[(start + j) % n].color = runs[(3 * j) / n];
                }
            }
            splines => {
                let start = corners[0];
                let mut spline = 0usize;
                for j in 0..n {
                    let index = (start + j) % n;
                    if j > 0 && corners.contains(&index) {
                        spline += 1;
                    }
                    let mut color = COLOR_CYCLE[(seed + spline) % 3];
                    // The last spline wraps around to the first one.
                    if spline == splines - 1 && (splines - 1) % 3 == 0 {
                        color = COLOR_CYCLE[(seed + 1) % 3];
                    }
                    edges[index].color = color;
                }
            }
        }
    }
}

impl DistanceFieldBackend for SegmentFieldBackend {
    fn compute(
        &self,
        outline: &Outline,
        params: &FieldParams,
    ) -> Result<DistanceField, GenerateError> {
        if params.width == 0 || params.height == 0 {
            return Err(GenerateError::GenerationFailed("zero-sized field".into()));
        }
        if params.pixel_range.is_nan() || params.pixel_range <= 0.0 {
            return Err(GenerateError::GenerationFailed(format!(
                "invalid pixel range {}",
                params.pixel_range
            )));
        }

        let edges = self.build_edges(outline);
        if edges.is_empty() {
            return Err(GenerateError::GenerationFailed("outline has no usable edges".into()));
        }

        let orientation = orientation(&edges);
        let channels = params.mode.channels();
        let texels = params.width as usize * params.height as usize;
        let mut values = Vec::with_capacity(texels * channels);
        let mut per_edge = Vec::with_capacity(edges.len());

        for row in 0..params.height {
            for col in 0..params.width {
                let p = Point::new(col as f32 + 0.5, row as f32 + 0.5);
                per_edge.clear();
                per_edge.extend(edges.iter().map(|edge| edge_distance(edge, p)));

                let sign = if winding(&edges, p) != 0 { 1.0 } else { -1.0 };
                let to_unit = |d: f32| 0.5 + d / params.pixel_range;
                let encode = |d: f32| to_unit(sign * d);

                let (nearest, true_min) = per_edge
                    .iter()
                    .enumerate()
                    .map(|(i, d)| (i, d.distance))
                    .fold((0, f32::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });

                match params.mode {
                    ChannelMode::Sdf => values.push(encode(true_min)),
                    ChannelMode::PseudoSdf => values.push(encode(per_edge[nearest].pseudo)),
                    ChannelMode::Msdf | ChannelMode::Mtsdf => {
                        let signed_true = sign * true_min;
                        let mut rgb = [RED, GREEN, BLUE].map(|channel| {
                            nearest_in_channel(&edges, &per_edge, channel)
                                .map_or(signed_true, |d| orientation * d.side_pseudo)
                        });
                        // A median on the wrong side of the fill rule would draw a
                        // false edge; fall back to the true distance there.
                        if median(rgb).signum() != sign {
                            rgb = [signed_true; 3];
                        }
                        values.extend(rgb.map(to_unit));
                        if params.mode == ChannelMode::Mtsdf {
                            values.push(encode(true_min));
                        }
                    }
                }
            }
        }

        Ok(DistanceField {
            width: params.width,
            height: params.height,
            channels,
            values,
        })
    }
}

fn tangents(segment: &Segment) -> (Point, Point) {
    let non_zero = |candidates: &[Point]| {
        candidates
            .iter()
            .copied()
            .find(|d| length(*d) > 0.0)
            .unwrap_or_default()
    };
    match *segment {
        Segment::Line(a, b) => (sub(b, a), sub(b, a)),
        Segment::Quad(a, c, b) => (
            non_zero(&[sub(c, a), sub(b, a)]),
            non_zero(&[sub(b, c), sub(b, a)]),
        ),
        Segment::Cubic(a, c0, c1, b) => (
            non_zero(&[sub(c0, a), sub(c1, a), sub(b, a)]),
            non_zero(&[sub(b, c1), sub(b, c0), sub(b, a)]),
        ),
    }
}

fn edge_distance(edge: &Edge, p: Point) -> EdgeDistance {
    let last = edge.points.len() - 2;
    let mut best = f32::INFINITY;
    let mut best_index = 0;
    let mut best_t = 0.0;
    for (i, pair) in edge.points.windows(2).enumerate() {
        let (d, t) = point_segment_distance(p, pair[0], pair[1]);
        if d < best {
            best = d;
            best_index = i;
            best_t = t;
        }
    }

    // Past an endpoint, measure against the tangent line instead.
    let (start, end) = (edge.points[0], edge.points[last + 1]);
    let before_start =
        best_index == 0 && best_t <= 0.0 && dot(sub(p, start), edge.start_dir) < 0.0;
    let past_end =
        best_index == last && best_t >= 1.0 && dot(sub(p, end), edge.end_dir) > 0.0;
    let beyond = if before_start {
        Some(cross(edge.start_dir, sub(p, start)))
    } else if past_end {
        Some(cross(edge.end_dir, sub(p, end)))
    } else {
        None
    };

    match beyond {
        Some(along) => EdgeDistance {
            distance: best,
            pseudo: along.abs().min(best),
            side_pseudo: along,
            ortho: if best > 0.0 { along.abs() / best } else { 1.0 },
        },
        None => {
            let (a, b) = (edge.points[best_index], edge.points[best_index + 1]);
            let side = cross(sub(b, a), sub(p, a)).signum();
            EdgeDistance {
                distance: best,
                pseudo: best,
                side_pseudo: side * best,
                ortho: 1.0,
            }
        }
    }
}

fn nearest_in_channel(
    edges: &[Edge],
    per_edge: &[EdgeDistance],
    channel: u8,
) -> Option<EdgeDistance> {
    edges
        .iter()
        .zip(per_edge)
        .filter(|(edge, _)| edge.color & channel != 0)
        .map(|(_, d)| *d)
        .reduce(|best, d| if d.closer_than(&best) { d } else { best })
}

/// Sign that makes `side_pseudo` positive inside: the sign of the total
/// signed area, since holes wind against their outer contour.
fn orientation(edges: &[Edge]) -> f32 {
    let area: f32 = edges
        .iter()
        .flat_map(|edge| edge.points.windows(2))
        .map(|pair| cross(pair[0], pair[1]))
        .sum();
    if area < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn median(v: [f32; 3]) -> f32 {
    v[0].min(v[1]).max(v[0].max(v[1]).min(v[2]))
}

/// Distance from `p` to segment `ab` and the unclamped projection parameter.
fn point_segment_distance(p: Point, a: Point, b: Point) -> (f32, f32) {
    let ab = sub(b, a);
    let len_sq = dot(ab, ab);
    if len_sq == 0.0 {
        return (length(sub(p, a)), 0.0);
    }
    let t = dot(sub(p, a), ab) / len_sq;
    let clamped = t.clamp(0.0, 1.0);
    let closest = Point::new(a.x + ab.x * clamped, a.y + ab.y * clamped);
    (length(sub(p, closest)), t)
}

/// Nonzero winding number of `p` over every flattened edge.
fn winding(edges: &[Edge], p: Point) -> i32 {
    let mut wn = 0;
    for edge in edges {
        for pair in edge.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let side = cross(sub(b, a), sub(p, a));
            if a.y <= p.y {
                if b.y > p.y && side > 0.0 {
                    wn += 1;
                }
            } else if b.y <= p.y && side < 0.0 {
                wn -= 1;
            }
        }
    }
    wn
}

fn sub(a: Point, b: Point) -> Point {
    Point::new(a.x - b.x, a.y - b.y)
}

fn dot(a: Point, b: Point) -> f32 {
    a.x * b.x + a.y * b.y
}

fn cross(a: Point, b: Point) -> f32 {
    a.x * b.y - a.y * b.x
}

fn length(a: Point) -> f32 {
    dot(a, a).sqrt()
}

fn normalize(a: Point) -> Point {
    let len = length(a);
    Point::new(a.x / len, a.y / len)
}
