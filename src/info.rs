//! Read-only diagnostics the host can show next to the node.
//!
//! Everything here is returned as owned values; the host copies what it
//! needs and nothing is shared with the polling path.

pub const DEVICE_LABEL: &str = "Sensel device";
pub const CONNECTED_CHANNEL: &str = "sensel connected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoTable {
    rows: Vec<Vec<String>>,
}

impl InfoTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Single row: the device label and the connected serial, empty when no
    /// device is open.
    pub fn for_device(serial: Option<&str>) -> Self {
        Self::new(vec![vec![
            DEVICE_LABEL.to_string(),
            serial.unwrap_or_default().to_string(),
        ]])
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn entry(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoChannel {
    pub name: String,
    pub value: f32,
}

pub fn info_channels() -> Vec<InfoChannel> {
    vec![InfoChannel {
        name: CONNECTED_CHANNEL.to_string(),
        value: 1.0,
    }]
}
