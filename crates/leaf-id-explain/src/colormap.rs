//! JET colormap (blue → cyan → yellow → red)

use image::Rgb;

fn channel(v: f32, center: f32) -> u8 {
    let intensity = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
    (intensity * 255.0).round() as u8
}

/// Map an 8-bit intensity to its JET color
#[must_use]
pub fn jet(value: u8) -> Rgb<u8> {
    let v = f32::from(value) / 255.0;
    Rgb([channel(v, 3.0), channel(v, 2.0), channel(v, 1.0)])
}
