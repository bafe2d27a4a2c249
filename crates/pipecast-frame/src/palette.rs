use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::PaletteError;

/// Number of entries in an indexed-color palette.
pub const PALETTE_SIZE: usize = 256;

/// Tables whose largest channel value is at most this are 6-bit (VGA DAC) data.
const SIX_BIT_MAX: u16 = 63;

/// Bounded wait for the palette file to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteConfig {
    /// Give up and report the palette unavailable after this long.
    pub wait_timeout: Duration,
    /// Delay between existence checks.
    pub retry_interval: Duration,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// A normalized 256-entry RGB lookup table.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [[u8; 3]; PALETTE_SIZE],
}

impl Palette {
    /// Build a palette from raw rows, applying 6-bit detection.
    ///
    /// If every channel value is at most 63 the whole table is scaled by 4.
    /// Otherwise values pass through unchanged and must fit in a byte.
    pub fn from_rows(rows: &[[u16; 3]]) -> Result<Self, PaletteError> {
        if rows.len() != PALETTE_SIZE {
            return Err(PaletteError::WrongSize(rows.len()));
        }

        let max = rows.iter().flatten().copied().max().unwrap_or(0);
        let scale = if max <= SIX_BIT_MAX { 4 } else { 1 };

        let mut colors = [[0u8; 3]; PALETTE_SIZE];
        for (index, (row, color)) in rows.iter().zip(colors.iter_mut()).enumerate() {
            for (value, channel) in row.iter().zip(color.iter_mut()) {
                if *value > u16::from(u8::MAX) {
                    return Err(PaletteError::Malformed {
                        line: index + 1,
                        reason: format!("channel value {value} exceeds 255"),
                    });
                }
                *channel = (value * scale).min(u16::from(u8::MAX)) as u8;
            }
        }

        Ok(Self { colors })
    }

    /// Parse a plain-text table of 256 rows with three integer columns.
    ///
    /// Columns may be separated by whitespace or commas. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn parse(text: &str) -> Result<Self, PaletteError> {
        let mut rows = Vec::with_capacity(PALETTE_SIZE);

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|field| !field.is_empty())
                .collect();
            if fields.len() != 3 {
                return Err(PaletteError::Malformed {
                    line: index + 1,
                    reason: format!("expected 3 columns, found {}", fields.len()),
                });
            }

            let mut row = [0u16; 3];
            for (field, slot) in fields.iter().zip(row.iter_mut()) {
                *slot = field.parse().map_err(|_| PaletteError::Malformed {
                    line: index + 1,
                    reason: format!("invalid channel value {field:?}"),
                })?;
            }
            rows.push(row);
        }

        Self::from_rows(&rows)
    }

    /// Load and normalize a palette file.
    ///
    /// A missing file is reported as [`PaletteError::Unavailable`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PaletteError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                PaletteError::Unavailable {
                    path: path.to_path_buf(),
                    waited: Duration::ZERO,
                }
            } else {
                PaletteError::Io {
                    path: path.to_path_buf(),
                    source: err,
                }
            }
        })?;
        let palette = Self::parse(&text)?;
        info!(?path, "palette loaded");
        Ok(palette)
    }

    /// Load a palette, retrying until it appears or `config.wait_timeout` expires.
    ///
    /// A file that exists but does not parse yet (producer still writing it) is
    /// retried too; the last error is returned when the wait runs out.
    pub fn wait_for(path: impl AsRef<Path>, config: &PaletteConfig) -> Result<Self, PaletteError> {
        let path = path.as_ref();
        let start = Instant::now();
        let mut announced = false;

        loop {
            let err = match Self::load(path) {
                Ok(palette) => return Ok(palette),
                Err(err) => err,
            };

            let waited = start.elapsed();
            if waited >= config.wait_timeout {
                return Err(match err {
                    PaletteError::Unavailable { .. } => PaletteError::Unavailable {
                        path: path.to_path_buf(),
                        waited,
                    },
                    other => other,
                });
            }

            if !announced {
                info!(?path, timeout = ?config.wait_timeout, "waiting for palette");
                announced = true;
            } else {
                debug!(?path, error = %err, "palette not ready");
            }
            std::thread::sleep(config.retry_interval);
        }
    }

    /// Color for a palette index.
    #[inline]
    pub fn color(&self, index: u8) -> [u8; 3] {
        self.colors[index as usize]
    }

    /// The full normalized table.
    pub fn colors(&self) -> &[[u8; 3]; PALETTE_SIZE] {
        &self.colors
    }
}

impl std::fmt::Debug for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Palette")
            .field("first", &self.colors[0])
            .field("last", &self.colors[PALETTE_SIZE - 1])
            .finish()
    }
}
