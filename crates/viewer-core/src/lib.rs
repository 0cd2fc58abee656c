//! Viewer geometry: coordinate normalization, the virtualized page list and
//! zoom/rotation arithmetic. Everything here is pure and free of I/O.

pub mod coords;
pub mod virtual_list;
pub mod zoom;

pub use coords::{
    fraction_to_page_space, page_space_to_fraction, rotate_fraction, to_fraction, to_pixels,
    unrotate_fraction, Normalizer, PageExtent,
};
pub use virtual_list::{VirtualItem, VirtualPageList};
pub use zoom::{clamp_page, clamp_zoom, normalize_rotation, rotate_by, rotated_size, step_zoom};
