use crate::dimensions::Dimensions;
use egui::{Color32, FontId, Painter, Pos2, Rect, Stroke, StrokeKind, Vec2};
use senselview::Contact;

/// Heat ramp stops from no force to peak force.
const HEAT_RAMP: [Color32; 4] = [
    Color32::from_rgb(240, 244, 250),
    Color32::from_rgb(64, 140, 220),
    Color32::from_rgb(250, 200, 40),
    Color32::from_rgb(210, 30, 30),
];

/// Contact markers cycle through these by slot.
const CONTACT_COLORS: [Color32; 4] = [
    Color32::from_rgb(20, 120, 60),
    Color32::from_rgb(120, 60, 170),
    Color32::from_rgb(30, 90, 200),
    Color32::from_rgb(200, 110, 20),
];

const BOUNDARY: Color32 = Color32::from_gray(90);

/// Heat-ramp colour for a normalized force in `[0, 1]`.
pub fn force_color(level: f32) -> Color32 {
    let pos = level.clamp(0.0, 1.0) * (HEAT_RAMP.len() - 1) as f32;
    let lo = (pos.floor() as usize).min(HEAT_RAMP.len() - 2);
    HEAT_RAMP[lo].lerp_to_gamma(HEAT_RAMP[lo + 1], pos - lo as f32)
}

fn contact_color(slot: usize) -> Color32 {
    CONTACT_COLORS[slot % CONTACT_COLORS.len()]
}

pub fn draw_sensor_boundary(painter: &Painter, corner: Pos2, width: f32, height: f32) {
    painter.rect_stroke(
        Rect::from_min_size(corner, Vec2::new(width, height)),
        4.0,
        Stroke::new(2.0, BOUNDARY),
        StrokeKind::Inside,
    );
}

/// Paint the row-major force grid as one rectangle per cell, normalized to
/// `peak`.
pub fn draw_heatmap(
    painter: &Painter,
    force: &[f32],
    rows: usize,
    cols: usize,
    peak: f32,
    corner: Pos2,
    size: Vec2,
) {
    if rows == 0 || cols == 0 || peak <= 0.0 {
        return;
    }
    let cell = Vec2::new(size.x / cols as f32, size.y / rows as f32);
    for (i, value) in force.iter().take(rows * cols).enumerate() {
        if *value <= 0.0 {
            continue;
        }
        let (r, c) = (i / cols, i % cols);
        let min = Pos2::new(corner.x + c as f32 * cell.x, corner.y + r as f32 * cell.y);
        painter.rect_filled(
            Rect::from_min_size(min, cell),
            0.0,
            force_color(*value / peak),
        );
    }
}

pub fn draw_contact(
    painter: &Painter,
    dims: &Dimensions,
    contact: &Contact,
    slot: usize,
    corner: Pos2,
    scale: f32,
) {
    let pos = dims.sensor_to_screen(contact.x, contact.y, corner, scale);
    let color = contact_color(slot);
    let radius = (4.0 + contact.total_force.max(0.0).sqrt()).min(40.0);

    painter.circle_filled(pos, radius, color.gamma_multiply(0.25));
    painter.circle_stroke(pos, radius, Stroke::new(2.0, color));
    painter.line_segment(
        [Pos2::new(pos.x - 3.0, pos.y), Pos2::new(pos.x + 3.0, pos.y)],
        Stroke::new(1.0, color),
    );
    painter.line_segment(
        [Pos2::new(pos.x, pos.y - 3.0), Pos2::new(pos.x, pos.y + 3.0)],
        Stroke::new(1.0, color),
    );

    painter.text(
        Pos2::new(pos.x + radius + 4.0, pos.y - radius),
        egui::Align2::LEFT_TOP,
        format!("{} {:.0}g", contact.id, contact.total_force),
        FontId::monospace(12.0),
        color,
    );
}

pub fn draw_status(painter: &Painter, pos: Pos2, text: &str) {
    painter.text(
        pos,
        egui::Align2::CENTER_TOP,
        text,
        FontId::monospace(14.0),
        Color32::GRAY,
    );
}
