//! Model module for segmentation architectures using the Burn framework
//!
//! This module provides:
//! - A U-Net style encoder/decoder for per-pixel defect segmentation
//! - Model configuration and hyperparameters

pub mod unet;

pub use unet::{ConvBlock, Decoder, Encoder, UNet, UNetConfig, UpBlock};
