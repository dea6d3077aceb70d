//! Pixel-format tags carried in every data fragment.
//!
//! The device identifies the image layout with a 16-bit tag. The engine
//! never converts pixels; it only carries the tag through to the frame
//! consumer so the colour-space stage knows how to interpret the bytes.

// ── PixelFormat ──────────────────────────────────────────────────

/// Image layout announced by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit unsigned, single channel.
    U8C1,
    /// 8-bit signed, single channel.
    S8C1,
    /// YUV 4:2:0 semi-planar (NV12/NV21).
    Yuv420Sp,
    /// YUV 4:2:2 semi-planar.
    Yuv422Sp,
    /// YUV 4:2:0 planar.
    Yuv420P,
    /// YUV 4:2:2 planar.
    Yuv422P,
    /// 8-bit signed, two channels, interleaved.
    S8C2Package,
    /// 8-bit signed, two channels, planar.
    S8C2Planar,
    S16C1,
    U16C1,
    /// 8-bit unsigned, three channels, interleaved.
    U8C3Package,
    /// 8-bit unsigned, three channels, planar.
    U8C3Planar,
    S32C1,
    U32C1,
    S64C1,
    U64C1,
    /// A tag outside the known catalogue, preserved verbatim.
    Other(u16),
}

impl PixelFormat {
    /// The raw 16-bit tag as it appears on the wire.
    pub const fn tag(self) -> u16 {
        match self {
            PixelFormat::U8C1 => 0,
            PixelFormat::S8C1 => 1,
            PixelFormat::Yuv420Sp => 2,
            PixelFormat::Yuv422Sp => 3,
            PixelFormat::Yuv420P => 4,
            PixelFormat::Yuv422P => 5,
            PixelFormat::S8C2Package => 6,
            PixelFormat::S8C2Planar => 7,
            PixelFormat::S16C1 => 8,
            PixelFormat::U16C1 => 9,
            PixelFormat::U8C3Package => 10,
            PixelFormat::U8C3Planar => 11,
            PixelFormat::S32C1 => 12,
            PixelFormat::U32C1 => 13,
            PixelFormat::S64C1 => 14,
            PixelFormat::U64C1 => 15,
            PixelFormat::Other(tag) => tag,
        }
    }

    /// Whether the tag maps to a known layout.
    pub const fn is_known(self) -> bool {
        !matches!(self, PixelFormat::Other(_))
    }
}

impl From<u16> for PixelFormat {
    fn from(tag: u16) -> Self {
        match tag {
            0 => PixelFormat::U8C1,
            1 => PixelFormat::S8C1,
            2 => PixelFormat::Yuv420Sp,
            3 => PixelFormat::Yuv422Sp,
            4 => PixelFormat::Yuv420P,
            5 => PixelFormat::Yuv422P,
            6 => PixelFormat::S8C2Package,
            7 => PixelFormat::S8C2Planar,
            8 => PixelFormat::S16C1,
            9 => PixelFormat::U16C1,
            10 => PixelFormat::U8C3Package,
            11 => PixelFormat::U8C3Planar,
            12 => PixelFormat::S32C1,
            13 => PixelFormat::U32C1,
            14 => PixelFormat::S64C1,
            15 => PixelFormat::U64C1,
            other => PixelFormat::Other(other),
        }
    }
}

impl From<PixelFormat> for u16 {
    fn from(format: PixelFormat) -> Self {
        format.tag()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Other(tag) => write!(f, "UNKNOWN({tag})"),
            known => write!(f, "{known:?}"),
        }
    }
}
