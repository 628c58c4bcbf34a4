use crate::dose_grid::{DoseVolume, LinearDoseMap};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use log::debug;
use ndarray::Array3;
use std::path::Path;
use thiserror::Error;

/// Largest deviation tolerated between consecutive grid frame offsets.
const FRAME_SPACING_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error)]
pub enum DoseLoaderError {
    #[error("Not an RT Dose object (modality {0})")]
    NotRtDose(String),

    #[error("Missing or malformed attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported bits allocated: {0}")]
    UnsupportedBitsAllocated(u16),

    #[error("Pixel data holds {actual} bytes, expected {expected}")]
    InconsistentPixelData { expected: usize, actual: usize },

    #[error("Raw dose sample {0} exceeds the 32-bit signed range")]
    SampleOutOfRange(u32),

    #[error("Grid frame offsets are not evenly spaced")]
    IrregularFrameSpacing,

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),
}

/// Reads DICOM RT Dose objects into [`DoseVolume`]s.
///
/// Raw samples keep their stored values; Dose Grid Scaling becomes the scale
/// of the volume's [`LinearDoseMap`]. The grid origin is the Image Position
/// (Patient) of the first frame.
pub struct DoseLoader;

impl DoseLoader {
    /// Load an RT Dose grid from a DICOM file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<DoseVolume, DoseLoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        Self::load_from_dicom_object(&dicom_object)
    }

    /// Load an RT Dose grid from a DICOM object
    ///
    /// # Errors
    ///
    /// Returns error if the object is not an RT Dose, lacks geometry
    /// attributes or its pixel data does not match the declared geometry
    pub fn load_from_dicom_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<DoseVolume, DoseLoaderError> {
        if let Some(modality) = Self::read_string(dicom_object, tags::MODALITY) {
            if modality != "RTDOSE" {
                return Err(DoseLoaderError::NotRtDose(modality));
            }
        }

        let rows = Self::read_int(dicom_object, tags::ROWS, "Rows")?;
        let columns = Self::read_int(dicom_object, tags::COLUMNS, "Columns")?;
        let frames = Self::read_int(dicom_object, tags::NUMBER_OF_FRAMES, "NumberOfFrames")
            .unwrap_or(1);
        let bits_allocated =
            Self::read_int(dicom_object, tags::BITS_ALLOCATED, "BitsAllocated")? as u16;
        let signed =
            Self::read_int(dicom_object, tags::PIXEL_REPRESENTATION, "PixelRepresentation")
                .is_ok_and(|representation| representation == 1);

        let pixel_spacing = Self::read_floats(dicom_object, tags::PIXEL_SPACING, "PixelSpacing")?;
        let [row_spacing, column_spacing] = pixel_spacing[..] else {
            return Err(DoseLoaderError::MissingAttribute("PixelSpacing"));
        };
        let z_spacing = Self::get_z_spacing(dicom_object, frames)?;

        let position = Self::read_floats(
            dicom_object,
            tags::IMAGE_POSITION_PATIENT,
            "ImagePositionPatient",
        )?;
        let [origin_x, origin_y, origin_z] = position[..] else {
            return Err(DoseLoaderError::MissingAttribute("ImagePositionPatient"));
        };

        let scaling = dicom_object
            .element(tags::DOSE_GRID_SCALING)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .ok_or(DoseLoaderError::MissingAttribute("DoseGridScaling"))?;

        let pixel_data = dicom_object.decode_pixel_data()?;
        let expected = frames * rows * columns;
        let samples = decode_samples(pixel_data.data(), bits_allocated, signed, expected)?;
        let data = Array3::from_shape_vec((frames, rows, columns), samples).map_err(|_| {
            DoseLoaderError::InconsistentPixelData {
                expected,
                actual: pixel_data.data().len(),
            }
        })?;

        debug!(
            "Loaded RT Dose {columns}x{rows}x{frames}, spacing ({column_spacing}, {row_spacing}, {z_spacing}), scaling {scaling}"
        );

        Ok(DoseVolume::new(
            data,
            (column_spacing, row_spacing, z_spacing),
            LinearDoseMap::new(scaling, 0.0),
        )
        .with_origin((origin_x, origin_y, origin_z)))
    }

    fn get_z_spacing(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        frames: usize,
    ) -> Result<f64, DoseLoaderError> {
        if frames > 1 {
            let offsets = Self::read_floats(
                dicom_object,
                tags::GRID_FRAME_OFFSET_VECTOR,
                "GridFrameOffsetVector",
            )?;
            if offsets.len() != frames {
                return Err(DoseLoaderError::MissingAttribute("GridFrameOffsetVector"));
            }
            return frame_spacing(&offsets);
        }

        dicom_object
            .element(tags::SLICE_THICKNESS)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .ok_or(DoseLoaderError::MissingAttribute("SliceThickness"))
    }

    fn read_int(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        name: &'static str,
    ) -> Result<usize, DoseLoaderError> {
        dicom_object
            .element(tag)
            .ok()
            .and_then(|element| element.to_int::<u32>().ok())
            .map(|value| value as usize)
            .ok_or(DoseLoaderError::MissingAttribute(name))
    }

    fn read_floats(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        name: &'static str,
    ) -> Result<Vec<f64>, DoseLoaderError> {
        dicom_object
            .element(tag)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .ok_or(DoseLoaderError::MissingAttribute(name))
    }

    fn read_string(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
        dicom_object
            .element(tag)
            .ok()?
            .to_str()
            .ok()
            .map(|value| value.trim().to_string())
    }
}

/// Spacing between frames, given their offsets from the first frame.
fn frame_spacing(offsets: &[f64]) -> Result<f64, DoseLoaderError> {
    let spacing = match offsets {
        [first, second, ..] => (second - first).abs(),
        _ => return Err(DoseLoaderError::MissingAttribute("GridFrameOffsetVector")),
    };
    let regular = offsets
        .windows(2)
        .all(|pair| ((pair[1] - pair[0]).abs() - spacing).abs() <= FRAME_SPACING_TOLERANCE);
    if !regular || spacing == 0.0 {
        return Err(DoseLoaderError::IrregularFrameSpacing);
    }
    Ok(spacing)
}

/// Decodes little-endian native pixel data into raw samples.
fn decode_samples(
    bytes: &[u8],
    bits_allocated: u16,
    signed: bool,
    expected: usize,
) -> Result<Vec<i32>, DoseLoaderError> {
    let width = match bits_allocated {
        16 => 2,
        32 => 4,
        other => return Err(DoseLoaderError::UnsupportedBitsAllocated(other)),
    };
    if bytes.len() < expected * width {
        return Err(DoseLoaderError::InconsistentPixelData {
            expected: expected * width,
            actual: bytes.len(),
        });
    }

    bytes
        .chunks_exact(width)
        .take(expected)
        .map(|chunk| match (width, signed) {
            (2, false) => Ok(i32::from(u16::from_le_bytes([chunk[0], chunk[1]]))),
            (2, true) => Ok(i32::from(i16::from_le_bytes([chunk[0], chunk[1]]))),
            (_, true) => Ok(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
            (_, false) => {
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                i32::try_from(raw).map_err(|_| DoseLoaderError::SampleOutOfRange(raw))
            }
        })
        .collect()
}
