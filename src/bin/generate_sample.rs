//! Writes a folder of synthetic ImageJ-style intensity tables plus a
//! matching `binner.toml`, for trying out `hpf-binner bin`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use hpf_binner::config::{BinRange, RunConfig, TreatmentConfig};

/// Logistic rise from `base` to `base + gain`, centred at `mid` hpf.
fn intensity(hpf: f64, base: f64, gain: f64, mid: f64) -> f64 {
    base + gain / (1.0 + (-(hpf - mid) * 2.0).exp())
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".into()));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let timeframe_s = 300.0;
    let n_frames = 72; // 6 h of imaging

    // (position, gain, midpoint hpf)
    let control = [(3u32, 180.0, 6.0), (5, 200.0, 6.2)];
    let morphant = [(6u32, 90.0, 7.0), (7, 110.0, 7.3), (9, 80.0, 6.8)];
    let dates = ["2025-05-20", "2025-05-22"];

    let mut written = 0;
    for date in dates {
        for &(pos, gain, mid) in control.iter().chain(morphant.iter()) {
            let path = out_dir.join(format!("{date}_Pos{pos:03}_embryo.csv"));
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            writer.write_record([" ", "Area", "Mean", "Min", "Max"])?;
            for i in 1..=n_frames {
                let hpf = (i as f64 - 1.0) * timeframe_s / 3600.0 + 4.0;
                let mean = intensity(hpf, 40.0, gain, mid) + rng.gauss(0.0, 6.0);
                writer.write_record([
                    i.to_string(),
                    "1520".to_string(),
                    format!("{mean:.3}"),
                    format!("{:.0}", (mean * 0.4).max(0.0)),
                    format!("{:.0}", mean * 2.1),
                ])?;
            }
            writer.flush()?;
            written += 1;
        }
    }

    let mut cfg = RunConfig::template();
    cfg.timeframe_s = timeframe_s;
    cfg.output_dir = out_dir.join("results");
    cfg.files = vec![out_dir.clone()];
    cfg.bin_range = Some(BinRange {
        start: 4.0,
        end: 10.0,
        width: 0.5,
    });
    cfg.treatments = vec![
        TreatmentConfig {
            name: "Control".into(),
            positions: control.iter().map(|c| c.0).collect(),
        },
        TreatmentConfig {
            name: "K4K8MO".into(),
            positions: morphant.iter().map(|c| c.0).collect(),
        },
    ];
    let cfg_path = out_dir.join("binner.toml");
    cfg.write(&cfg_path)?;

    println!(
        "Wrote {written} intensity tables and {} to {}",
        cfg_path.display(),
        out_dir.display()
    );
    Ok(())
}
