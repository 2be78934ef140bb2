use image::{Rgb, RgbImage};

use crate::domain::detection::Detection;

pub const BOX_THICKNESS: i32 = 3;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_ADVANCE: i32 = 6;
const LABEL_HEIGHT: i32 = 11;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([64, 160, 255]),
    Rgb([255, 200, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

/// Dibuja caja y etiqueta de cada detección directamente sobre el frame.
pub fn annotate(image: &mut RgbImage, detections: &[Detection]) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    for det in detections {
        let color = class_color(det.class_id);
        let (left, top, right, bottom) = (
            det.x1.round() as i32,
            det.y1.round() as i32,
            det.x2.round() as i32,
            det.y2.round() as i32,
        );
        for inset in 0..BOX_THICKNESS {
            draw_rectangle(image, left + inset, top + inset, right - inset, bottom - inset, color);
        }

        let text = format!("{} {:.0}%", det.label, det.score * 100.0);
        let text_width = text.chars().count() as i32 * GLYPH_ADVANCE + 2;
        // Encima de la caja si cabe; si no, dentro.
        let label_y = if top - LABEL_HEIGHT >= 0 { top - LABEL_HEIGHT } else { top + BOX_THICKNESS };
        fill_rect(image, left, label_y, left + text_width, label_y + LABEL_HEIGHT - 1, Rgb([0, 0, 0]));
        draw_label(image, left + 2, label_y + 2, &text, color);
    }
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if right < left || bottom < top {
        return;
    }
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    for x in left.max(0)..=right.min(max_x) {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top.max(0)..=bottom.min(max_y) {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    for y in top.max(0)..=bottom.min(max_y) {
        for x in left.max(0)..=right.min(max_x) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        put(image, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

// Fuente 5x7; caracteres sin glifo dejan un hueco.
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        'Á' => [0b00010, 0b01110, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'É' => [0b00010, 0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'Í' => [0b00010, 0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'Ó' => [0b00010, 0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'Ú' => [0b00010, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'Ñ' => [0b01110, 0b00000, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection { x1, y1, x2, y2, score: 0.87, class_id: 0, label: "persona".into() }
    }

    #[test]
    fn box_edges_are_painted_with_the_class_colour() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([64, 64, 64]));
        annotate(&mut image, &[det(20.0, 30.0, 80.0, 90.0)]);

        let green = class_color(0);
        for inset in 0..BOX_THICKNESS as u32 {
            assert_eq!(*image.get_pixel(50, 90 - inset), green);
            assert_eq!(*image.get_pixel(20 + inset, 60), green);
            assert_eq!(*image.get_pixel(80 - inset, 60), green);
        }
        // Interior intacto.
        assert_eq!(*image.get_pixel(50, 60), Rgb([64, 64, 64]));
    }

    #[test]
    fn label_bar_sits_above_the_box() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([64, 64, 64]));
        annotate(&mut image, &[det(20.0, 30.0, 80.0, 90.0)]);
        let bar_row = 30 - LABEL_HEIGHT as u32;
        let painted = (20..60).filter(|&x| *image.get_pixel(x, bar_row) != Rgb([64, 64, 64])).count();
        assert!(painted > 0);
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let mut image = RgbImage::new(16, 16);
        annotate(&mut image, &[det(-50.0, -50.0, 500.0, 500.0)]);
        annotate(&mut image, &[det(40.0, 40.0, 20.0, 20.0)]);
    }
}
