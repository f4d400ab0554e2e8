//! Horn-Schunck optical flow with multi-scale pyramid.
//!
//! Flow is estimated on a grayscale copy of the frames, optionally at a
//! reduced working resolution, and scaled back up before warping.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use upscaler_core::frame::CHANNELS;
use upscaler_core::Frame;

/// A 2D flow field storing (dx, dy) per pixel.
#[derive(Debug, Clone)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    /// Per-pixel displacement vectors [dx, dy].
    pub data: Vec<[f32; 2]>,
}

/// Parameters for optical flow computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowParams {
    /// Number of Horn-Schunck iterations per pyramid level.
    pub iterations: u32,
    /// Smoothness weight (Lagrange multiplier).
    pub alpha: f32,
    /// Number of multi-scale pyramid levels.
    pub pyramid_levels: u32,
    /// Longest edge of the working resolution; 0 keeps full size.
    pub max_dimension: u32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            iterations: 50,
            alpha: 1.0,
            pyramid_levels: 3,
            max_dimension: 480,
        }
    }
}

/// A single-channel f32 image.
#[derive(Debug, Clone)]
struct Gray {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Gray {
    fn from_frame(frame: &Frame) -> Self {
        let data = frame
            .data()
            .chunks_exact(CHANNELS)
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) / 255.0)
            .collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            data,
        }
    }

    #[inline]
    fn at(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.width as usize + x]
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x0 + 1, y0) * fx;
        let bottom = self.at(x0, y0 + 1) * (1.0 - fx) + self.at(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    // Box-filter down by 2, rounding dimensions up.
    fn downsample(&self) -> Self {
        let dw = self.width.div_ceil(2);
        let dh = self.height.div_ceil(2);
        let mut data = vec![0.0f32; (dw * dh) as usize];
        for y in 0..dh {
            for x in 0..dw {
                let (sx, sy) = (x as i32 * 2, y as i32 * 2);
                data[(y * dw + x) as usize] = 0.25
                    * (self.at(sx, sy) + self.at(sx + 1, sy) + self.at(sx, sy + 1)
                        + self.at(sx + 1, sy + 1));
            }
        }
        Self {
            width: dw,
            height: dh,
            data,
        }
    }

    fn resize(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(self.sample((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    // Resample `self` at positions displaced by `flow` (backward warp).
    fn warp(&self, flow: &FlowField) -> Self {
        let w = self.width as usize;
        let data = flow
            .data
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                self.sample(x + f[0], y + f[1])
            })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl FlowField {
    /// Create a zero flow field.
    pub fn zeros(w: u32, h: u32) -> Self {
        Self {
            width: w,
            height: h,
            data: vec![[0.0, 0.0]; w as usize * h as usize],
        }
    }

    /// Flow from `prev` to `next`: a point at `p` in `prev` appears at
    /// `p + flow(p)` in `next`.
    pub fn compute(prev: &Frame, next: &Frame, params: &FlowParams) -> Self {
        let (w, h) = (prev.width(), prev.height());
        let (ww, wh) = working_size(w, h, params.max_dimension);

        let prev_gray = Gray::from_frame(prev).resize(ww, wh);
        let next_gray = Gray::from_frame(next).resize(ww, wh);

        let mut prev_pyr = vec![prev_gray];
        let mut next_pyr = vec![next_gray];
        for _ in 1..params.pyramid_levels.max(1) {
            let (Some(p), Some(n)) = (prev_pyr.last(), next_pyr.last()) else {
                break;
            };
            if p.width < 8 || p.height < 8 {
                break;
            }
            let (p, n) = (p.downsample(), n.downsample());
            prev_pyr.push(p);
            next_pyr.push(n);
        }

        // Coarse to fine: warp `next` by the running estimate, then solve for
        // the residual motion at this level.
        let mut flow: Option<FlowField> = None;
        for (p, n) in prev_pyr.iter().zip(next_pyr.iter()).rev() {
            let current = match flow.take() {
                Some(f) => f.resized(p.width, p.height),
                None => FlowField::zeros(p.width, p.height),
            };
            let warped = n.warp(&current);
            let delta = horn_schunck(p, &warped, params);
            flow = Some(current.add(&delta));
        }

        flow.unwrap_or_else(|| FlowField::zeros(ww, wh)).resized(w, h)
    }

    fn add(mut self, other: &FlowField) -> Self {
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            a[0] += b[0];
            a[1] += b[1];
        }
        self
    }

    /// Resample to new dimensions, scaling vectors with the size change.
    pub fn resized(&self, new_w: u32, new_h: u32) -> FlowField {
        if new_w == self.width && new_h == self.height {
            return self.clone();
        }
        let kx = new_w as f32 / self.width.max(1) as f32;
        let ky = new_h as f32 / self.height.max(1) as f32;
        let mut out = FlowField::zeros(new_w, new_h);
        for y in 0..new_h {
            let sy = ((y as f32 / ky) as u32).min(self.height.saturating_sub(1));
            for x in 0..new_w {
                let sx = ((x as f32 / kx) as u32).min(self.width.saturating_sub(1));
                let f = self
                    .data
                    .get((sy * self.width + sx) as usize)
                    .copied()
                    .unwrap_or([0.0, 0.0]);
                out.data[(y * new_w + x) as usize] = [f[0] * kx, f[1] * ky];
            }
        }
        out
    }

    /// Backward-warp a frame by `scale` times this flow: each output pixel
    /// samples `frame` at `p - scale * flow(p)`.
    pub fn warp_frame(&self, frame: &Frame, scale: f32) -> Frame {
        let (w, h) = (frame.width(), frame.height());
        let mut out = Frame::new(w, h);
        let stride = w as usize * CHANNELS;

        out.data_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, dst)| {
                for x in 0..w as usize {
                    let idx = y * w as usize + x;
                    let f = self.data.get(idx).copied().unwrap_or([0.0, 0.0]);
                    let src_x = x as f32 - f[0] * scale;
                    let src_y = y as f32 - f[1] * scale;
                    let px = bilinear_rgb(frame, src_x, src_y);
                    dst[x * CHANNELS..x * CHANNELS + CHANNELS].copy_from_slice(&px);
                }
            });
        out
    }

    /// Get the flow magnitude at a pixel.
    pub fn magnitude_at(&self, x: u32, y: u32) -> f32 {
        let idx = (y * self.width + x) as usize;
        let flow = self.data.get(idx).copied().unwrap_or([0.0, 0.0]);
        (flow[0] * flow[0] + flow[1] * flow[1]).sqrt()
    }

    /// Mean displacement over the field.
    pub fn mean(&self) -> [f32; 2] {
        if self.data.is_empty() {
            return [0.0, 0.0];
        }
        let n = self.data.len() as f32;
        let (sx, sy) = self
            .data
            .iter()
            .fold((0.0, 0.0), |(sx, sy), f| (sx + f[0], sy + f[1]));
        [sx / n, sy / n]
    }
}

fn working_size(w: u32, h: u32, max_dimension: u32) -> (u32, u32) {
    let longest = w.max(h);
    if max_dimension == 0 || longest <= max_dimension {
        return (w, h);
    }
    let k = max_dimension as f64 / longest as f64;
    (
        ((w as f64 * k).round() as u32).max(1),
        ((h as f64 * k).round() as u32).max(1),
    )
}

fn bilinear_rgb(frame: &Frame, x: f32, y: f32) -> [u8; 3] {
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let at = |px: i32, py: i32| frame.pixel(px.clamp(0, w - 1) as u32, py.clamp(0, h - 1) as u32);
    let (p00, p10, p01, p11) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));

    let mut out = [0u8; 3];
    for c in 0..CHANNELS {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Horn-Schunck optical flow on a single scale.
fn horn_schunck(prev: &Gray, next: &Gray, params: &FlowParams) -> FlowField {
    let (w, h) = (prev.width as usize, prev.height as usize);
    let size = w * h;
    let (ix, iy, it) = gradients(prev, next);
    let alpha_sq = params.alpha * params.alpha;

    let mut u = vec![0.0f32; size];
    let mut v = vec![0.0f32; size];
    let mut u_next = vec![0.0f32; size];
    let mut v_next = vec![0.0f32; size];

    for _ in 0..params.iterations {
        u_next
            .par_chunks_mut(w)
            .zip(v_next.par_chunks_mut(w))
            .enumerate()
            .for_each(|(y, (u_row, v_row))| {
                for x in 0..w {
                    let idx = y * w + x;
                    let left = if x > 0 { idx - 1 } else { idx };
                    let right = if x + 1 < w { idx + 1 } else { idx };
                    let up = if y > 0 { idx - w } else { idx };
                    let down = if y + 1 < h { idx + w } else { idx };

                    // 4-neighbour average
                    let u_avg = (u[left] + u[right] + u[up] + u[down]) * 0.25;
                    let v_avg = (v[left] + v[right] + v[up] + v[down]) * 0.25;

                    let denom = alpha_sq + ix[idx] * ix[idx] + iy[idx] * iy[idx];
                    let common = (ix[idx] * u_avg + iy[idx] * v_avg + it[idx]) / denom;

                    u_row[x] = u_avg - ix[idx] * common;
                    v_row[x] = v_avg - iy[idx] * common;
                }
            });
        std::mem::swap(&mut u, &mut u_next);
        std::mem::swap(&mut v, &mut v_next);
    }

    FlowField {
        width: prev.width,
        height: prev.height,
        data: u.into_iter().zip(v).map(|(dx, dy)| [dx, dy]).collect(),
    }
}

/// Image gradients Ix, Iy, It averaged over a 2x2 block.
fn gradients(prev: &Gray, next: &Gray) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let (w, h) = (prev.width as i32, prev.height as i32);
    let size = (w * h) as usize;
    let mut ix = vec![0.0f32; size];
    let mut iy = vec![0.0f32; size];
    let mut it = vec![0.0f32; size];

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            let (p, n) = (prev, next);
            ix[idx] = 0.25
                * ((p.at(x + 1, y) - p.at(x, y))
                    + (p.at(x + 1, y + 1) - p.at(x, y + 1))
                    + (n.at(x + 1, y) - n.at(x, y))
                    + (n.at(x + 1, y + 1) - n.at(x, y + 1)));
            iy[idx] = 0.25
                * ((p.at(x, y + 1) - p.at(x, y))
                    + (p.at(x + 1, y + 1) - p.at(x + 1, y))
                    + (n.at(x, y + 1) - n.at(x, y))
                    + (n.at(x + 1, y + 1) - n.at(x + 1, y)));
            it[idx] = 0.25
                * ((n.at(x, y) - p.at(x, y))
                    + (n.at(x + 1, y) - p.at(x + 1, y))
                    + (n.at(x, y + 1) - p.at(x, y + 1))
                    + (n.at(x + 1, y + 1) - p.at(x + 1, y + 1)));
        }
    }

    (ix, iy, it)
}
