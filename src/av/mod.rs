//! Elementary stream descriptions and the access units producers push.

mod packet;
pub use packet::*;

use serde::Deserialize;

/// Broad category of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    /// MPEG-4 object descriptor stream
    ObjectDescriptor,
    /// MPEG-4 scene description (BIFS/LASeR) stream
    Scene,
    /// Private or metadata stream
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecType {
    H264,
    Svc,
    H265,
    Shvc,
    Mpeg4Visual,
    Mpeg1Video,
    Mpeg2Video,
    Vc1,
    Jpeg,
    Png,
    Aac,
    Mpeg1Audio,
    Mpeg2Audio,
    Ac3,
    Eac3,
    /// Opaque MPEG-4 systems data (OD/BIFS access units)
    Mpeg4Systems,
    /// Anything the multiplexer has no dedicated stream type for
    Private,
}

impl CodecType {
    /// Kind used when the producer does not say otherwise
    pub fn default_kind(&self) -> StreamKind {
        match self {
            CodecType::H264
            | CodecType::Svc
            | CodecType::H265
            | CodecType::Shvc
            | CodecType::Mpeg4Visual
            | CodecType::Mpeg1Video
            | CodecType::Mpeg2Video
            | CodecType::Vc1
            | CodecType::Jpeg
            | CodecType::Png => StreamKind::Video,
            CodecType::Aac
            | CodecType::Mpeg1Audio
            | CodecType::Mpeg2Audio
            | CodecType::Ac3
            | CodecType::Eac3 => StreamKind::Audio,
            CodecType::Mpeg4Systems => StreamKind::Scene,
            CodecType::Private => StreamKind::Private,
        }
    }
}
