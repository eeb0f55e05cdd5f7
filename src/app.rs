use crate::dimensions::Dimensions;
use crate::render;
use senselview::{ChannelBuffers, PollOutcome, SensorDriver, SensorSession};
use std::time::Instant;

/// Peak force decays by this factor per repaint so the heatmap rescales
/// after a hard press.
const PEAK_DECAY: f32 = 0.98;
const PEAK_FLOOR: f32 = 1.0;

pub struct SenselApp<D: SensorDriver> {
    session: SensorSession<D>,
    buffers: ChannelBuffers,
    dims: Dimensions,
    peak: f32,
    frames_read: u64,
}

impl<D: SensorDriver> SenselApp<D> {
    pub fn new(session: SensorSession<D>) -> Self {
        Self {
            session,
            buffers: ChannelBuffers::default(),
            dims: Dimensions::default(),
            peak: PEAK_FLOOR,
            frames_read: 0,
        }
    }

    fn tick(&mut self) {
        if let Some(samples) = self.session.output_descriptor().num_samples {
            if self.buffers.num_samples() != samples {
                self.buffers.resize(samples);
            }
        }
        if let PollOutcome::Read { consumed, .. } =
            self.session.poll(Instant::now(), &mut self.buffers.sink())
        {
            self.frames_read += consumed as u64;
        }

        let frame_peak = self.buffers.force.iter().copied().fold(0.0, f32::max);
        self.peak = (self.peak * PEAK_DECAY).max(frame_peak).max(PEAK_FLOOR);
    }

    fn status_text(&self) -> String {
        let table = self.session.info_table();
        let label = table.entry(0, 0).unwrap_or_default();
        match self.session.device() {
            Some(dev) => format!(
                "{}: {}  fw {}  {}x{}  contacts {}  frames {}",
                label,
                table.entry(0, 1).unwrap_or_default(),
                dev.firmware,
                dev.sensor.num_cols,
                dev.sensor.num_rows,
                self.buffers.contact_triples().count(),
                self.frames_read,
            ),
            None => format!(
                "{}: not connected (retry #{})",
                label,
                self.session.reacquisitions()
            ),
        }
    }
}

impl<D: SensorDriver> eframe::App for SenselApp<D> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick();

        let screen_rect = ctx.screen_rect();
        self.dims.screen_width = screen_rect.width();
        self.dims.screen_height = screen_rect.height();

        let grid = self.session.device().map(|dev| {
            self.dims.set_sensor_size(dev.sensor.width, dev.sensor.height);
            (dev.sensor.num_rows as usize, dev.sensor.num_cols as usize)
        });

        let scale = self.dims.get_sensor_scale();
        let corner = self.dims.get_sensor_corner(scale);
        let size = egui::Vec2::new(
            self.dims.sensor_width_mm * scale,
            self.dims.sensor_height_mm * scale,
        );
        let status = self.status_text();

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::WHITE))
            .show(ctx, |ui| {
                let painter = ui.painter();

                if let Some((rows, cols)) = grid {
                    render::draw_heatmap(
                        painter,
                        &self.buffers.force,
                        rows,
                        cols,
                        self.peak,
                        corner,
                        size,
                    );
                }
                render::draw_sensor_boundary(painter, corner, size.x, size.y);

                if let Some(frame) = self.session.frame() {
                    for (slot, contact) in frame.contacts.iter().enumerate() {
                        render::draw_contact(painter, &self.dims, contact, slot, corner, scale);
                    }
                }

                let status_pos = egui::Pos2::new(
                    self.dims.screen_width / 2.0,
                    corner.y + size.y + self.dims.margin,
                );
                render::draw_status(painter, status_pos, &status);
            });

        ctx.request_repaint();
    }
}
