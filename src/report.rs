use color_eyre::Result;
use comfy_table::{
    presets,
    Attribute,
    Cell,
    Color,
    ContentArrangement,
    Table,
};
use huddle_engine::{
    ConnectionQuality,
    Participant,
    StreamEvent,
    StreamHandle,
    StreamState,
};
use serde::Serialize;
use std::fmt;

/// Final state of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub name: Option<String>,
    pub estimated_bandwidth_kbps: Option<u32>,
    pub participants: Vec<Participant>,
    pub streams: Vec<StreamHandle>,
    pub acquisitions: usize,
    pub failed_acquisitions: usize,
    pub stream_events: Vec<StreamEvent>,
}

impl Report {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn participants_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                ["Participant", "Name", "Role", "Video", "Audio", "Spotlight", "Connection", "Last update"]
                    .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
            );

        for participant in &self.participants {
            table.add_row(vec![
                Cell::new(&participant.id),
                Cell::new(&participant.display_name),
                Cell::new(participant.role),
                flag(participant.video_enabled),
                flag(participant.audio_enabled),
                flag(participant.is_spotlighted),
                Cell::new(participant.connection_quality).fg(quality_color(participant.connection_quality)),
                Cell::new(format!(
                    "{} by {} ({})",
                    participant.last_updated_at.format("%H:%M:%S%.3f"),
                    participant.last_updated_by_role,
                    participant.last_updated_source
                )),
            ]);
        }
        table
    }

    fn streams_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                ["Stream", "State", "Tier", "Codec", "Retries", "Last error"]
                    .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
            );

        for stream in &self.streams {
            table.add_row(vec![
                Cell::new(&stream.participant_id),
                Cell::new(stream.state).fg(state_color(stream.state)),
                Cell::new(stream.current_tier),
                Cell::new(stream.codec),
                Cell::new(stream.retry_count),
                Cell::new(
                    stream
                        .last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ]);
        }
        table
    }
}

fn flag(enabled: bool) -> Cell {
    if enabled {
        Cell::new("on").fg(Color::Green)
    } else {
        Cell::new("off").fg(Color::DarkGrey)
    }
}

fn quality_color(quality: ConnectionQuality) -> Color {
    match quality {
        ConnectionQuality::Excellent => Color::Green,
        ConnectionQuality::Good => Color::Yellow,
        ConnectionQuality::Poor => Color::Red,
    }
}

fn state_color(state: StreamState) -> Color {
    match state {
        StreamState::Active => Color::Green,
        StreamState::Degraded | StreamState::Retrying | StreamState::Starting => Color::Yellow,
        StreamState::Failed => Color::Red,
        StreamState::Idle | StreamState::Stopped => Color::DarkGrey,
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "Scenario: {name}")?;
        }
        match self.estimated_bandwidth_kbps {
            Some(kbps) => writeln!(f, "Estimated bandwidth: {kbps} kbps")?,
            None => writeln!(f, "Estimated bandwidth: no samples")?,
        }
        writeln!(f, "{}", self.participants_table())?;
        writeln!(f, "{}", self.streams_table())?;
        write!(
            f,
            "Acquisitions: {} ({} failed), stream events: {}",
            self.acquisitions,
            self.failed_acquisitions,
            self.stream_events.len()
        )
    }
}
