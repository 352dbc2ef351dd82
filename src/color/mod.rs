pub mod luminance;
