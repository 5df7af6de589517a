//! U-Net Architecture for Steel Defect Segmentation
//!
//! This module implements a compact U-Net using the Burn framework for
//! per-pixel defect classification on steel surface crops. The encoder is a
//! separate sub-module so the trainer can freeze its backbone while keeping
//! the decoder (and the encoder's normalization layers) trainable.

use burn::{
    config::Config,
    module::{Module, ModuleMapper, ParamId},
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the UNet segmentation model
#[derive(Config, Debug)]
pub struct UNetConfig {
    /// Number of output mask channels (4 defect classes for Severstal)
    #[config(default = "4")]
    pub num_classes: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "16")]
    pub base_filters: usize,
}

impl UNetConfig {
    /// Initialize the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        UNet::new(self, device)
    }
}

/// A CNN block with Conv2d, BatchNorm and ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }

    /// Disable gradients for the convolution, leaving BatchNorm trainable
    fn freeze_conv(self) -> Self {
        Self {
            conv: self.conv.map(&mut SetRequireGrad(false)),
            ..self
        }
    }
}

/// Encoder: three downsampling stages plus a bottleneck
///
/// Feature widths follow a doubling scheme:
/// `C -> F -> 2F -> 4F -> 8F`, with spatial resolution halved after each of
/// the first three stages. Inputs must have height and width divisible by 8.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,
    pub block3: ConvBlock<B>,
    pub bottleneck: ConvBlock<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> Encoder<B> {
    pub fn new(in_channels: usize, base: usize, device: &B::Device) -> Self {
        Self {
            block1: ConvBlock::new(in_channels, base, device),
            block2: ConvBlock::new(base, base * 2, device),
            block3: ConvBlock::new(base * 2, base * 4, device),
            bottleneck: ConvBlock::new(base * 4, base * 8, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    /// Forward pass returning the bottleneck features and the skip tensors
    /// at full, half and quarter resolution.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, [Tensor<B, 4>; 3]) {
        let s1 = self.block1.forward(x);
        let s2 = self.block2.forward(self.pool.forward(s1.clone()));
        let s3 = self.block3.forward(self.pool.forward(s2.clone()));
        let bottom = self.bottleneck.forward(self.pool.forward(s3.clone()));
        (bottom, [s1, s2, s3])
    }

    /// Freeze the convolutional backbone, keeping normalization layers trainable
    pub fn freeze_backbone(self) -> Self {
        Self {
            block1: self.block1.freeze_conv(),
            block2: self.block2.freeze_conv(),
            block3: self.block3.freeze_conv(),
            bottleneck: self.bottleneck.freeze_conv(),
            pool: self.pool,
        }
    }
}

/// A decoder stage: transpose-conv upsampling followed by a conv block over
/// the concatenation with the matching encoder skip.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    pub up: ConvTranspose2d<B>,
    pub conv: ConvBlock<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let up = ConvTranspose2dConfig::new([in_channels, out_channels], [2, 2])
            .with_stride([2, 2])
            .init(device);
        // after concat with the skip the block sees 2 * out_channels
        let conv = ConvBlock::new(out_channels * 2, out_channels, device);
        Self { up, conv }
    }

    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.up.forward(x);
        let x = Tensor::cat(vec![x, skip], 1);
        self.conv.forward(x)
    }
}

/// Decoder: three upsampling stages plus a 1x1 projection head
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub up3: UpBlock<B>,
    pub up2: UpBlock<B>,
    pub up1: UpBlock<B>,
    pub head: Conv2d<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(base: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            up3: UpBlock::new(base * 8, base * 4, device),
            up2: UpBlock::new(base * 4, base * 2, device),
            up1: UpBlock::new(base * 2, base, device),
            head: Conv2dConfig::new([base, num_classes], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, skips: [Tensor<B, 4>; 3]) -> Tensor<B, 4> {
        let [s1, s2, s3] = skips;
        let x = self.up3.forward(x, s3);
        let x = self.up2.forward(x, s2);
        let x = self.up1.forward(x, s1);
        self.head.forward(x)
    }
}

/// Steel defect segmentation U-Net
///
/// Callable on a batch of images `[batch, in_channels, H, W]`, producing
/// per-pixel class logits `[batch, num_classes, H, W]` matching the target
/// mask's spatial shape.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    num_classes: usize,
}

impl<B: Backend> UNet<B> {
    /// Create a new UNet from configuration
    pub fn new(config: &UNetConfig, device: &B::Device) -> Self {
        Self {
            encoder: Encoder::new(config.in_channels, config.base_filters, device),
            decoder: Decoder::new(config.base_filters, config.num_classes, device),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let (bottom, skips) = self.encoder.forward(x);
        self.decoder.forward(bottom, skips)
    }

    /// Get the number of output mask channels
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Freeze the encoder backbone, leaving its normalization layers and the
    /// whole decoder trainable.
    pub fn freeze_encoder(self) -> Self {
        Self {
            encoder: self.encoder.freeze_backbone(),
            ..self
        }
    }

    /// Re-enable gradients for every parameter unconditionally.
    pub fn unfreeze(self) -> Self {
        self.map(&mut SetRequireGrad(true))
    }
}

/// Module mapper flipping the require-grad flag on every float parameter
struct SetRequireGrad(bool);

impl<B: Backend> ModuleMapper<B> for SetRequireGrad {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        tensor.set_require_grad(self.0)
    }
}
