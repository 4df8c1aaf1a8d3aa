use crate::{
    enums::SortBy,
    slice_stack::{Slice, SliceStack},
    windowing::Window,
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use log::{info, warn};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

pub struct StackLoader;

impl StackLoader {
    /// Turn DICOM objects into a slice stack
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no object carries a decodable image
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<SliceStack, StackLoaderError> {
        let mut slices_with_order: Vec<_> = dicom_objects
            .iter()
            .enumerate()
            .filter_map(|(index, dicom_object)| {
                let slice = Self::extract_slice(dicom_object);
                if slice.is_none() {
                    warn!("skipping DICOM object {} without usable image data", index);
                }
                slice.map(|slice| (Self::get_sort_order(dicom_object, &sort_by), slice))
            })
            .collect();

        if slices_with_order.is_empty() {
            return Err(StackLoaderError::NoValidImages);
        }

        if !matches!(sort_by, SortBy::None) {
            slices_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        let stack = SliceStack::new(
            slices_with_order
                .into_iter()
                .map(|(_, slice)| slice)
                .collect(),
        );
        info!("loaded {} slices", stack.len());
        Ok(stack)
    }

    /// Load a slice stack from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<SliceStack, StackLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a slice stack from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<SliceStack, StackLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(StackLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Slice> {
        let rows = Self::get_int(dicom_object, tags::ROWS)? as u32;
        let columns = Self::get_int(dicom_object, tags::COLUMNS)? as u32;
        let bits_allocated = Self::get_int(dicom_object, tags::BITS_ALLOCATED).unwrap_or(16) as u16;
        let signed = Self::get_int(dicom_object, tags::PIXEL_REPRESENTATION) == Some(1);

        let pixel_spacing = Self::get_multi_float(dicom_object, tags::PIXEL_SPACING)
            .filter(|spacing| spacing.len() >= 2)
            .map(|spacing| (spacing[0] as f32, spacing[1] as f32))
            .unwrap_or((1.0, 1.0));
        let slice_thickness =
            Self::get_float(dicom_object, tags::SLICE_THICKNESS).map(|t| t as f32);
        let position = Self::get_multi_float(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .and_then(|pos| pos.get(2).copied())
            .unwrap_or(0.0);

        let default_window = match (
            Self::get_first_float(dicom_object, tags::WINDOW_CENTER),
            Self::get_first_float(dicom_object, tags::WINDOW_WIDTH),
        ) {
            (Some(center), Some(width)) => Window::new(center, width).ok(),
            _ => None,
        };

        let pixels = Self::decode_first_frame(dicom_object, rows, columns, bits_allocated)?;

        Some(Slice {
            pixels,
            rows,
            columns,
            pixel_spacing,
            slice_thickness,
            bits_allocated,
            signed,
            position,
            default_window,
        })
    }

    /// Raw bytes of the first frame (no multiframe support)
    fn decode_first_frame(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        rows: u32,
        columns: u32,
        bits_allocated: u16,
    ) -> Option<Vec<u8>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let frame_len = rows as usize * columns as usize * (bits_allocated as usize).div_ceil(8);
        let data = pixel_data.data();
        data.get(..frame_len).map(<[u8]>::to_vec)
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<f64> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                Self::get_multi_float(dicom_object, tags::IMAGE_POSITION_PATIENT)
                    .and_then(|pos| pos.get(2).copied())
            }
            SortBy::TablePosition => Self::get_float(dicom_object, tags::TABLE_POSITION),
            SortBy::InstanceNumber => {
                Self::get_int(dicom_object, tags::INSTANCE_NUMBER).map(|n| n as f64)
            }
            SortBy::None => Some(0.0),
        }
    }

    fn get_int(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<i32> {
        dicom_object.element(tag).ok()?.to_int::<i32>().ok()
    }

    fn get_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_multi_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }

    fn get_first_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        Self::get_multi_float(dicom_object, tag).and_then(|values| values.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR, dicom_value};
    use dicom::object::FileMetaTableBuilder;
    use dicom_dictionary_std::uids;

    /// 2x2 16-bit CT slice at `z`, samples `base..base + 4`.
    fn ct_slice(z: &str, base: u16) -> FileDicomObject<InMemDicomObject> {
        let pixels: Vec<u8> = (base..base + 4).flat_map(u16::to_le_bytes).collect();
        let mut obj = ct_header(z);
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(pixels),
        ));
        with_meta(obj)
    }

    fn ct_header(z: &str) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, "2.25.1"),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(2_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(2_u16)),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
            DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, dicom_value!(Strs, ["0.5", "0.7"])),
            DataElement::new(tags::SLICE_THICKNESS, VR::DS, "2.5"),
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                dicom_value!(Strs, ["0", "0", z]),
            ),
            DataElement::new(tags::WINDOW_CENTER, VR::DS, dicom_value!(Strs, ["40", "60"])),
            DataElement::new(tags::WINDOW_WIDTH, VR::DS, dicom_value!(Strs, ["400", "800"])),
        ])
    }

    fn with_meta(obj: InMemDicomObject) -> FileDicomObject<InMemDicomObject> {
        obj.with_meta(FileMetaTableBuilder::new().transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN))
            .unwrap()
    }

    #[test]
    fn slices_are_sorted_by_position() {
        let objects = [ct_slice("5", 500), ct_slice("-2.5", 100), ct_slice("1.0", 300)];
        let stack =
            StackLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap();
        let positions: Vec<f64> = stack.slices().iter().map(|slice| slice.position).collect();
        assert_eq!(positions, vec![-2.5, 1.0, 5.0]);

        let first = &stack.slices()[0];
        let samples: Vec<u16> = first
            .pixels
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(samples, vec![100, 101, 102, 103]);
    }

    #[test]
    fn slice_metadata_is_read_from_tags() {
        let stack =
            StackLoader::load_from_dicom_objects(&[ct_slice("3", 0)], SortBy::default()).unwrap();
        let slice = &stack.slices()[0];
        assert_eq!((slice.rows, slice.columns), (2, 2));
        assert_eq!(slice.bits_allocated, 16);
        assert!(!slice.signed);
        assert_eq!(slice.pixel_spacing, (0.5, 0.7));
        assert_eq!(slice.slice_thickness, Some(2.5));
        assert_eq!(slice.position, 3.0);
        assert_eq!(slice.pixels.len(), 8);
        assert_eq!(slice.default_window, Window::new(40.0, 400.0).ok());
    }

    #[test]
    fn objects_without_pixels_are_skipped() {
        let objects = [with_meta(ct_header("0")), ct_slice("1", 7)];
        let stack = StackLoader::load_from_dicom_objects(&objects, SortBy::default()).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.slices()[0].position, 1.0);

        let result =
            StackLoader::load_from_dicom_objects(&[with_meta(ct_header("0"))], SortBy::default());
        assert!(matches!(result, Err(StackLoaderError::NoValidImages)));
    }

    #[test]
    fn empty_input_has_no_images() {
        let result = StackLoader::load_from_dicom_objects(&[], SortBy::default());
        assert!(matches!(result, Err(StackLoaderError::NoValidImages)));
    }

    #[test]
    fn directory_without_dicom_files_is_rejected() {
        let dir = std::env::temp_dir().join(format!("dicom-mpr-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "not an image").unwrap();
        let result = StackLoader::load_from_directory(&dir, SortBy::default());
        fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(result, Err(StackLoaderError::NoValidImages)));
    }
}
