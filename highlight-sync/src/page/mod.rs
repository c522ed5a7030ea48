// Page-side components: selection tracking and the highlight popup
// Everything touching the rendered page goes through PageSurface

pub mod popup;
pub mod port;
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;
