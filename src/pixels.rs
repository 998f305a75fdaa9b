use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use image::{DynamicImage, ImageBuffer, Luma};
use serde::Serialize;
use tiff::decoder::{Decoder, DecodingResult};

/// One 16-bit grayscale frame.
pub type Frame = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Marker in file names of annotated 3D stacks.
pub const STACK_MARKER: &str = "3dann";

// ---------------------------------------------------------------------------
// PixelStack – frames × height × width
// ---------------------------------------------------------------------------

/// A time-lapse stack of equally sized frames.
#[derive(Debug, Clone)]
pub struct PixelStack {
    frames: Vec<Frame>,
    /// Physical pixel edge length in µm, if known.
    pub pixel_size_um: Option<f64>,
    /// Seconds between frames, if known.
    pub interval_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelRecord {
    #[serde(rename = "PixelID")]
    pub pixel_id: String,
    #[serde(rename = "Frame")]
    pub frame: u32,
    /// Row index.
    #[serde(rename = "X")]
    pub x: u32,
    /// Column index.
    #[serde(rename = "Y")]
    pub y: u32,
    #[serde(rename = "Intensity")]
    pub intensity: u16,
    #[serde(rename = "X_um", skip_serializing_if = "Option::is_none")]
    pub x_um: Option<f64>,
    #[serde(rename = "Y_um", skip_serializing_if = "Option::is_none")]
    pub y_um: Option<f64>,
    #[serde(rename = "Time_s", skip_serializing_if = "Option::is_none")]
    pub time_s: Option<f64>,
}

impl PixelStack {
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self> {
        if let Some(first) = frames.first() {
            let dims = first.dimensions();
            for (i, f) in frames.iter().enumerate() {
                ensure!(
                    f.dimensions() == dims,
                    "frame {i} is {:?}, expected {dims:?}",
                    f.dimensions()
                );
            }
        }
        Ok(PixelStack {
            frames,
            pixel_size_um: None,
            interval_s: None,
        })
    }

    /// Load a stack from a single image or from a directory, where every
    /// file whose name contains `3dann` contributes frames, in name order.
    /// A multi-page TIFF gives one frame per page. Intensities keep their
    /// stored value; 8-bit samples are widened, never rescaled.
    pub fn open(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().contains(STACK_MARKER))
                })
                .collect();
            files.sort();
            if files.is_empty() {
                bail!("no '*{STACK_MARKER}*' frames in {}", path.display());
            }
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut frames = Vec::new();
        for f in &files {
            let decoded = read_frames(f).with_context(|| format!("decoding {}", f.display()))?;
            frames.extend(decoded);
        }
        log::info!("Loaded {} frame(s) from {}", frames.len(), path.display());
        Self::from_frames(frames)
    }

    pub fn with_calibration(mut self, pixel_size_um: Option<f64>, interval_s: Option<f64>) -> Self {
        self.pixel_size_um = pixel_size_um;
        self.interval_s = interval_s;
        self
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// `(width, height)` of every frame, `None` for an empty stack.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.dimensions())
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Every non-zero pixel, scanning frame, then row, then column.
    pub fn nonzero_pixels(&self) -> Vec<PixelRecord> {
        let mut out = Vec::new();
        for (i, frame) in self.frames.iter().enumerate() {
            let (width, height) = frame.dimensions();
            for row in 0..height {
                for col in 0..width {
                    let Luma([v]) = *frame.get_pixel(col, row);
                    if v == 0 {
                        continue;
                    }
                    let i = i as u32;
                    out.push(PixelRecord {
                        pixel_id: format!("{i}{row}{col}"),
                        frame: i,
                        x: row,
                        y: col,
                        intensity: v,
                        x_um: self.pixel_size_um.map(|s| row as f64 * s),
                        y_um: self.pixel_size_um.map(|s| col as f64 * s),
                        time_s: self.interval_s.map(|t| i as f64 * t),
                    });
                }
            }
        }
        out
    }
}

fn read_frames(path: &Path) -> Result<Vec<Frame>> {
    let is_tiff = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
    if is_tiff {
        return read_tiff_pages(path);
    }
    let img = image::open(path)?;
    Ok(vec![gray_frame(img)?])
}

/// Keep the native sample value of a grayscale image. Alpha is dropped.
fn gray_frame(img: DynamicImage) -> Result<Frame> {
    let frame = match img {
        DynamicImage::ImageLuma16(buf) => buf,
        DynamicImage::ImageLuma8(buf) => {
            Frame::from_fn(buf.width(), buf.height(), |x, y| Luma([u16::from(buf.get_pixel(x, y)[0])]))
        }
        DynamicImage::ImageLumaA8(buf) => {
            Frame::from_fn(buf.width(), buf.height(), |x, y| Luma([u16::from(buf.get_pixel(x, y)[0])]))
        }
        DynamicImage::ImageLumaA16(buf) => {
            Frame::from_fn(buf.width(), buf.height(), |x, y| Luma([buf.get_pixel(x, y)[0]]))
        }
        other => bail!("expected a grayscale image, got {:?}", other.color()),
    };
    Ok(frame)
}

/// Every page of a TIFF as its own frame.
fn read_tiff_pages(path: &Path) -> Result<Vec<Frame>> {
    let file = std::fs::File::open(path)?;
    let mut decoder = Decoder::new(std::io::BufReader::new(file))?;
    let mut frames = Vec::new();
    loop {
        let (width, height) = decoder.dimensions()?;
        let page = frames.len();
        let samples: Vec<u16> = match decoder.read_image()? {
            DecodingResult::U16(data) => data,
            DecodingResult::U8(data) => data.into_iter().map(u16::from).collect(),
            _ => bail!("page {page}: only 8- and 16-bit grayscale pages are supported"),
        };
        let frame = Frame::from_raw(width, height, samples).with_context(|| {
            format!("page {page}: sample count does not match {width}x{height} grayscale")
        })?;
        frames.push(frame);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    log::debug!("{}: {} TIFF page(s)", path.display(), frames.len());
    Ok(frames)
}

pub fn write_pixels_csv(records: &[PixelRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for r in records {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> PixelStack {
        let mut a = Frame::new(3, 2);
        a.put_pixel(2, 0, Luma([7]));
        let mut b = Frame::new(3, 2);
        b.put_pixel(0, 1, Luma([9]));
        b.put_pixel(1, 1, Luma([4]));
        PixelStack::from_frames(vec![a, b]).unwrap()
    }

    #[test]
    fn scan_order_and_coordinates() {
        let px = stack().nonzero_pixels();
        assert_eq!(px.len(), 3);
        assert_eq!((px[0].frame, px[0].x, px[0].y, px[0].intensity), (0, 0, 2, 7));
        assert_eq!(px[0].pixel_id, "002");
        assert_eq!((px[1].frame, px[1].x, px[1].y), (1, 1, 0));
        assert_eq!((px[2].frame, px[2].x, px[2].y), (1, 1, 1));
    }

    #[test]
    fn mismatched_frames_rejected() {
        assert!(PixelStack::from_frames(vec![Frame::new(2, 2), Frame::new(3, 2)]).is_err());
    }

    #[test]
    fn calibration_adds_physical_columns() {
        let px = stack().with_calibration(Some(0.5), Some(30.0)).nonzero_pixels();
        assert_eq!(px[1].x_um, Some(0.5));
        assert_eq!(px[1].time_s, Some(30.0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.csv");
        write_pixels_csv(&px, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("PixelID,Frame,X,Y,Intensity,X_um,Y_um,Time_s\n"));
    }

    #[test]
    fn open_directory_of_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = image::ImageBuffer::<Luma<u16>, Vec<u16>>::new(2, 2);
        f.put_pixel(1, 1, Luma([300]));
        f.save(dir.path().join("emb_3dann_t000.png")).unwrap();
        f.save(dir.path().join("emb_3dann_t001.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let s = PixelStack::open(dir.path()).unwrap();
        assert_eq!(s.n_frames(), 2);
        assert_eq!(s.dimensions(), Some((2, 2)));
        let px = s.nonzero_pixels();
        assert_eq!(px.len(), 2);
        assert_eq!(px[1].intensity, 300);
    }

    #[test]
    fn eight_bit_values_are_not_rescaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb_3dann.png");
        let mut f = image::GrayImage::new(2, 1);
        f.put_pixel(0, 0, Luma([7u8]));
        f.put_pixel(1, 0, Luma([255u8]));
        f.save(&path).unwrap();

        let px = PixelStack::open(&path).unwrap().nonzero_pixels();
        assert_eq!(px.len(), 2);
        assert_eq!(px[0].intensity, 7);
        assert_eq!(px[1].intensity, 255);
    }

    #[test]
    fn multipage_tiff_gives_one_frame_per_page() {
        use tiff::encoder::{TiffEncoder, colortype::Gray16};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb_3dann.tif");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut enc = TiffEncoder::new(std::io::BufWriter::new(file)).unwrap();
            for page in 0..3u16 {
                // one lit pixel per page, moving along the first row
                let mut data = vec![0u16; 4 * 2];
                data[page as usize] = 100 + page;
                enc.write_image::<Gray16>(4, 2, &data).unwrap();
            }
        }

        let s = PixelStack::open(&path).unwrap();
        assert_eq!(s.n_frames(), 3);
        assert_eq!(s.dimensions(), Some((4, 2)));
        let px = s.nonzero_pixels();
        let seen: Vec<_> = px.iter().map(|p| (p.frame, p.x, p.y, p.intensity)).collect();
        assert_eq!(seen, vec![(0, 0, 0, 100), (1, 0, 1, 101), (2, 0, 2, 102)]);
    }
}
