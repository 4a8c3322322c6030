//! Optional CSV dump of every Cartesian radar point, for offline analysis of
//! housing reflections and filter tuning.
//!
//! ```text
//! TIME(mS), frame, X,Z,Y
//! 10432, 318, -0.41, 0.12, 19.87
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use scope_types::PointCloud;

pub const HEADER: &str = "TIME(mS), frame, X,Z,Y";

pub struct RadarDump<W: Write = BufWriter<File>> {
    out: W,
    rows: u64,
}

impl RadarDump {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> RadarDump<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{HEADER}")?;
        Ok(Self { out, rows: 0 })
    }

    /// One row per point of `cloud`, stamped with `now_ms`.
    pub fn write_cloud(&mut self, now_ms: u64, cloud: &PointCloud) -> io::Result<()> {
        for p in &cloud.points {
            writeln!(self.out, "{now_ms}, {}, {}, {}, {}", cloud.frame_number, p.x, p.z, p.y)?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scope_types::PointSample;
    use std::error::Error;

    #[test]
    fn rows_are_time_frame_x_z_y() -> Result<(), Box<dyn Error>> {
        let cloud = PointCloud {
            points: vec![
                PointSample { x: 1.5, y: 20.0, z: -0.25, snr: 0, noise: 0 },
                PointSample { x: 0.0, y: 7.0, z: 2.0, snr: 0, noise: 0 },
            ],
            frame_number: 12,
            time_cpu_cycles: 0,
            timestamp: Utc::now(),
        };
        let mut dump = RadarDump::new(Vec::new())?;
        dump.write_cloud(900, &cloud)?;
        assert_eq!(dump.rows(), 2);

        let text = String::from_utf8(dump.into_inner())?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, [HEADER, "900, 12, 1.5, -0.25, 20", "900, 12, 0, 2, 7"]);
        Ok(())
    }

    #[test]
    fn create_writes_header_to_disk() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("radar.csv");
        let mut dump = RadarDump::create(&path)?;
        dump.flush()?;
        drop(dump);
        assert_eq!(std::fs::read_to_string(&path)?, format!("{HEADER}\n"));
        Ok(())
    }
}
