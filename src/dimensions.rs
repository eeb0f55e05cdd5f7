use egui::Pos2;

/// Maps the sensor's physical area (millimetres) onto the window.
pub struct Dimensions {
    pub sensor_width_mm: f32,
    pub sensor_height_mm: f32,
    pub screen_width: f32,
    pub screen_height: f32,
    pub margin: f32,
    /// Space reserved under the sensor for the status line.
    pub footer: f32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            sensor_width_mm: 240.0,
            sensor_height_mm: 138.0,
            screen_width: 720.0,
            screen_height: 460.0,
            margin: 15.0,
            footer: 30.0,
        }
    }
}

impl Dimensions {
    pub fn set_sensor_size(&mut self, width_mm: f32, height_mm: f32) {
        if width_mm > 0.0 && height_mm > 0.0 {
            self.sensor_width_mm = width_mm;
            self.sensor_height_mm = height_mm;
        }
    }

    /// Screen points per millimetre, preserving the sensor's aspect ratio.
    pub fn get_sensor_scale(&self) -> f32 {
        let usable_w = (self.screen_width - self.margin * 2.0).max(1.0);
        let usable_h = (self.screen_height - self.margin * 2.0 - self.footer).max(1.0);
        (usable_w / self.sensor_width_mm).min(usable_h / self.sensor_height_mm)
    }

    pub fn get_sensor_corner(&self, scale: f32) -> Pos2 {
        Pos2::new(
            self.screen_width / 2.0 - (self.sensor_width_mm / 2.0) * scale,
            (self.screen_height - self.footer) / 2.0 - (self.sensor_height_mm / 2.0) * scale,
        )
    }

    pub fn sensor_to_screen(&self, x_mm: f32, y_mm: f32, corner: Pos2, scale: f32) -> Pos2 {
        Pos2::new(corner.x + x_mm * scale, corner.y + y_mm * scale)
    }
}
