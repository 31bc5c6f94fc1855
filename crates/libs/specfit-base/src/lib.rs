//! # specfit-base
//! Core library for specfit.
//! Contains the basic types, settings and error handling shared by the
//! specular decomposition crates.

#![warn(missing_docs)]

use std::fmt::{Display, Formatter};

pub mod error;
pub mod math;
pub mod progress;
pub mod settings;
pub mod utils;

/// Colour channel of a reflectance observation or a specular curve.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Red channel.
    #[cfg_attr(feature = "cli", clap(alias = "r"))]
    Red = 0,
    /// Green channel.
    #[cfg_attr(feature = "cli", clap(alias = "g"))]
    Green = 1,
    /// Blue channel.
    #[cfg_attr(feature = "cli", clap(alias = "b"))]
    Blue = 2,
}

impl Channel {
    /// All channels in storage order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Number of colour channels.
    pub const COUNT: usize = 3;

    /// Returns the storage index of the channel.
    pub const fn index(&self) -> usize { *self as usize }

    /// Returns the channel at the given storage index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Red),
            1 => Some(Self::Green),
            2 => Some(Self::Blue),
            _ => None,
        }
    }

    /// Returns the name of the channel as it appears in persisted files.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Blue => "Blue",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.name()) }
}
