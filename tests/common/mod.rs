use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};

/// A WAV fixture in the temp directory, removed on drop.
pub struct WavFixture {
    path: PathBuf,
}

impl WavFixture {
    /// Writes `seconds` of a mono sine tone at `sample_rate`.
    pub fn sine(sample_rate: u32, frequency: f32, seconds: f32) -> Self {
        let path = std::env::temp_dir().join(format!("ambience-fixture-{}.wav", uuid::Uuid::new_v4()));
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as u32;
        for n in 0..frames {
            let t = n as f32 / sample_rate as f32;
            let sample = (t * frequency * std::f32::consts::TAU).sin() * 0.5;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locator(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for WavFixture {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}
