//! Quality classification for media items.
//!
//! [`classify`] is a pure function from a media item's technical metadata to
//! a [`QualityScore`]: a resolution tier, a LOW/MEDIUM/HIGH rating within
//! that tier, an upgrade flag, and human-readable deficiency strings.
//!
//! Malformed input never raises -- unrecognized resolution descriptors fall
//! back to SD, unknown bitrates rate MEDIUM, and the issues list carries
//! whatever is worth a second look.

use serde::{Deserialize, Serialize};
use std::fmt;

use cur_core::config::{QualityThresholds, TierCutoffs};

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Resolution class of a media item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Sd,
    Hd720,
    Hd1080,
    Uhd4k,
}

impl ResolutionTier {
    /// Classify a resolution descriptor string against the fixed set of
    /// recognized patterns.
    ///
    /// Only labelled formats are recognized ("4K", "2160p", "UHD", "1080p",
    /// "1080i", "720p"). Anything else -- including raw pixel dimensions like
    /// "3840x2160" -- classifies as SD. That coarseness is deliberate:
    /// sources that report raw dimensions get a conservative tier rather
    /// than a guessed one.
    pub fn from_descriptor(descriptor: &str) -> Self {
        match descriptor.trim().to_ascii_lowercase().as_str() {
            "4k" | "2160p" | "uhd" => Self::Uhd4k,
            "1080p" | "1080i" => Self::Hd1080,
            "720p" => Self::Hd720,
            _ => Self::Sd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd => "sd",
            Self::Hd720 => "720p",
            Self::Hd1080 => "1080p",
            Self::Uhd4k => "4k",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sd" => Some(Self::Sd),
            "720p" => Some(Self::Hd720),
            "1080p" => Some(Self::Hd1080),
            "4k" => Some(Self::Uhd4k),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LOW/MEDIUM/HIGH rating within a resolution tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TierQuality {
    Low,
    Medium,
    High,
}

impl TierQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for TierQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Input metadata
// ---------------------------------------------------------------------------

/// One audio track as reported by the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AudioTrackInfo {
    /// Codec name as reported (e.g. "aac", "truehd", "dts-hd ma").
    pub codec: String,
    /// Channel count (2 = stereo, 6 = 5.1, ...).
    pub channels: u32,
    /// Bitrate in kbps, when the source reports one.
    pub bitrate_kbps: Option<u32>,
    /// Object-audio flag (Atmos, DTS:X).
    pub object_audio: bool,
}

/// Technical metadata for a single media item, as gathered by a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaTechInfo {
    /// Resolution descriptor string ("1080p", "4K", raw dimensions, ...).
    pub resolution: Option<String>,
    /// Video codec name as reported.
    pub video_codec: Option<String>,
    /// Raw video bitrate in kbps.
    pub video_bitrate_kbps: Option<u32>,
    /// All candidate audio tracks. May be empty.
    pub audio_tracks: Vec<AudioTrackInfo>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Result of classifying one media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub resolution_tier: ResolutionTier,
    pub tier_quality: TierQuality,
    pub needs_upgrade: bool,
    /// Human-readable deficiency strings, one per sub-threshold dimension.
    pub issues: Vec<String>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Codec-efficiency multiplier applied to the raw video bitrate before
/// comparing against tier cutoffs. Modern codecs deliver comparable quality
/// at a fraction of the H.264 bitrate.
fn codec_efficiency(codec: Option<&str>) -> f64 {
    let Some(codec) = codec else {
        return 1.0;
    };
    let codec = codec.to_ascii_lowercase();
    if codec.contains("av1") {
        3.0
    } else if codec.contains("hevc") || codec.contains("h265") || codec.contains("265") {
        2.0
    } else if codec.contains("vp9") {
        1.5
    } else {
        1.0
    }
}

/// Lossless codecs rate HIGH regardless of reported bitrate.
fn is_lossless(codec: &str) -> bool {
    let codec = codec.to_ascii_lowercase();
    codec.contains("truehd")
        || codec.contains("dts-hd")
        || codec.contains("dtshd")
        || codec.contains("flac")
        || codec.contains("alac")
        || codec.contains("pcm")
}

/// Preference rank for audio track selection: object audio beats lossless
/// beats lossy; ties break on bitrate, then channel count.
fn audio_rank(track: &AudioTrackInfo) -> (u8, u32, u32) {
    let class = if track.object_audio {
        3
    } else if is_lossless(&track.codec) {
        2
    } else {
        1
    };
    (class, track.bitrate_kbps.unwrap_or(0), track.channels)
}

/// Pick the best audio track by total-order preference, if any exist.
fn select_best_audio(tracks: &[AudioTrackInfo]) -> Option<&AudioTrackInfo> {
    tracks.iter().max_by_key(|t| audio_rank(t))
}

/// Rate the audio dimension. Object audio and lossless rate HIGH; lossy
/// tracks rate by bitrate. An absent or bitrate-less track rates MEDIUM so
/// missing metadata never manufactures an upgrade recommendation.
fn audio_sub_tier(track: Option<&AudioTrackInfo>, thresholds: &QualityThresholds) -> TierQuality {
    let Some(track) = track else {
        return TierQuality::Medium;
    };
    if track.object_audio || is_lossless(&track.codec) {
        return TierQuality::High;
    }
    match track.bitrate_kbps {
        None => TierQuality::Medium,
        Some(kbps) if kbps >= thresholds.audio_medium_kbps => TierQuality::Medium,
        Some(_) => TierQuality::Low,
    }
}

fn cutoffs_for(tier: ResolutionTier, thresholds: &QualityThresholds) -> TierCutoffs {
    match tier {
        ResolutionTier::Sd => thresholds.sd,
        ResolutionTier::Hd720 => thresholds.hd720,
        ResolutionTier::Hd1080 => thresholds.hd1080,
        ResolutionTier::Uhd4k => thresholds.uhd4k,
    }
}

/// Classify a media item's technical metadata into a [`QualityScore`].
///
/// The overall tier quality is the minimum of the video and audio
/// sub-tiers: a high-bitrate video with poor audio cannot score HIGH.
pub fn classify(info: &MediaTechInfo, thresholds: &QualityThresholds) -> QualityScore {
    let tier = info
        .resolution
        .as_deref()
        .map(ResolutionTier::from_descriptor)
        .unwrap_or(ResolutionTier::Sd);
    let cutoffs = cutoffs_for(tier, thresholds);

    let mut issues = Vec::new();

    // Video dimension: effective bitrate = raw bitrate weighted by codec
    // efficiency, compared against this tier's cutoffs.
    let video_quality = match info.video_bitrate_kbps {
        None => {
            issues.push("Video bitrate unknown".to_string());
            TierQuality::Medium
        }
        Some(raw) => {
            let effective = (raw as f64 * codec_efficiency(info.video_codec.as_deref())) as u32;
            if effective >= cutoffs.high_kbps {
                TierQuality::High
            } else if effective >= cutoffs.medium_kbps {
                TierQuality::Medium
            } else {
                issues.push(format!(
                    "Low video bitrate for {tier} tier ({effective} kbps effective, below {} kbps)",
                    cutoffs.medium_kbps
                ));
                TierQuality::Low
            }
        }
    };

    // Audio dimension: best candidate track by preference order.
    let best_audio = select_best_audio(&info.audio_tracks);
    let audio_quality = audio_sub_tier(best_audio, thresholds);
    if audio_quality == TierQuality::Low {
        issues.push("Audio quality below target".to_string());
    }

    let tier_quality = video_quality.min(audio_quality);

    QualityScore {
        resolution_tier: tier,
        tier_quality,
        needs_upgrade: tier_quality == TierQuality::Low,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> QualityThresholds {
        QualityThresholds::default()
    }

    fn aac_stereo(kbps: u32) -> AudioTrackInfo {
        AudioTrackInfo {
            codec: "aac".into(),
            channels: 2,
            bitrate_kbps: Some(kbps),
            object_audio: false,
        }
    }

    fn info_1080p(video_kbps: u32, audio: Vec<AudioTrackInfo>) -> MediaTechInfo {
        MediaTechInfo {
            resolution: Some("1080p".into()),
            video_codec: Some("h264".into()),
            video_bitrate_kbps: Some(video_kbps),
            audio_tracks: audio,
        }
    }

    // -- Resolution tier ----------------------------------------------------

    #[test]
    fn recognized_resolution_patterns() {
        assert_eq!(ResolutionTier::from_descriptor("4K"), ResolutionTier::Uhd4k);
        assert_eq!(
            ResolutionTier::from_descriptor("2160p"),
            ResolutionTier::Uhd4k
        );
        assert_eq!(
            ResolutionTier::from_descriptor(" UHD "),
            ResolutionTier::Uhd4k
        );
        assert_eq!(
            ResolutionTier::from_descriptor("1080p"),
            ResolutionTier::Hd1080
        );
        assert_eq!(
            ResolutionTier::from_descriptor("1080i"),
            ResolutionTier::Hd1080
        );
        assert_eq!(
            ResolutionTier::from_descriptor("720p"),
            ResolutionTier::Hd720
        );
        assert_eq!(ResolutionTier::from_descriptor("480p"), ResolutionTier::Sd);
    }

    #[test]
    fn raw_pixel_dimensions_fall_back_to_sd() {
        // Known coarse edge case: unlabelled formats are not guessed at.
        assert_eq!(
            ResolutionTier::from_descriptor("3840x2160"),
            ResolutionTier::Sd
        );
        assert_eq!(
            ResolutionTier::from_descriptor("1920x1080"),
            ResolutionTier::Sd
        );
    }

    #[test]
    fn missing_resolution_is_sd() {
        let info = MediaTechInfo {
            resolution: None,
            video_codec: Some("h264".into()),
            video_bitrate_kbps: Some(5_000),
            audio_tracks: vec![aac_stereo(192)],
        };
        let score = classify(&info, &thresholds());
        assert_eq!(score.resolution_tier, ResolutionTier::Sd);
    }

    // -- Combined video and audio rating -------------------------------------

    #[test]
    fn low_bitrate_1080p_with_poor_audio_is_low() {
        let info = info_1080p(3_000, vec![aac_stereo(64)]);
        let score = classify(&info, &thresholds());
        assert_eq!(score.resolution_tier, ResolutionTier::Hd1080);
        assert_eq!(score.tier_quality, TierQuality::Low);
        assert!(score.needs_upgrade);
        assert!(
            score.issues.iter().any(|i| i.contains("Low video bitrate")),
            "issues: {:?}",
            score.issues
        );
        assert!(score
            .issues
            .iter()
            .any(|i| i.contains("Audio quality below target")));
    }

    // -- Codec efficiency ---------------------------------------------------

    #[test]
    fn hevc_doubles_effective_bitrate() {
        // 3000 kbps raw is LOW for 1080p h264 but 6000 effective for HEVC.
        let mut info = info_1080p(3_000, vec![aac_stereo(192)]);
        info.video_codec = Some("hevc".into());
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::Medium);
        assert!(!score.needs_upgrade);
    }

    #[test]
    fn av1_triples_effective_bitrate() {
        // 3000 * 3.0 = 9000 effective, clearing the 1080p HIGH cutoff, but
        // lossy stereo audio caps the overall tier at MEDIUM.
        let mut info = info_1080p(3_000, vec![aac_stereo(192)]);
        info.video_codec = Some("av1".into());
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::Medium);
    }

    // -- Audio selection and capping ----------------------------------------

    #[test]
    fn object_audio_preferred_over_higher_bitrate_lossy() {
        let tracks = vec![
            AudioTrackInfo {
                codec: "eac3".into(),
                channels: 6,
                bitrate_kbps: Some(1_500),
                object_audio: false,
            },
            AudioTrackInfo {
                codec: "truehd".into(),
                channels: 8,
                bitrate_kbps: Some(800),
                object_audio: true,
            },
        ];
        let best = select_best_audio(&tracks).unwrap();
        assert!(best.object_audio);
    }

    #[test]
    fn lossless_preferred_over_lossy() {
        let tracks = vec![aac_stereo(640), AudioTrackInfo {
            codec: "flac".into(),
            channels: 2,
            bitrate_kbps: None,
            object_audio: false,
        }];
        let best = select_best_audio(&tracks).unwrap();
        assert_eq!(best.codec, "flac");
    }

    #[test]
    fn lossy_ties_break_on_bitrate_then_channels() {
        let tracks = vec![aac_stereo(128), aac_stereo(256)];
        assert_eq!(select_best_audio(&tracks).unwrap().bitrate_kbps, Some(256));

        let tracks = vec![
            AudioTrackInfo {
                codec: "ac3".into(),
                channels: 6,
                bitrate_kbps: Some(384),
                object_audio: false,
            },
            AudioTrackInfo {
                codec: "aac".into(),
                channels: 2,
                bitrate_kbps: Some(384),
                object_audio: false,
            },
        ];
        assert_eq!(select_best_audio(&tracks).unwrap().channels, 6);
    }

    #[test]
    fn good_video_with_poor_audio_cannot_score_high() {
        let info = info_1080p(12_000, vec![aac_stereo(64)]);
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::Low);
    }

    #[test]
    fn high_needs_both_dimensions_high() {
        let info = info_1080p(
            12_000,
            vec![AudioTrackInfo {
                codec: "truehd".into(),
                channels: 8,
                bitrate_kbps: Some(3_000),
                object_audio: true,
            }],
        );
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::High);
        assert!(!score.needs_upgrade);
        assert!(score.issues.is_empty());
    }

    // -- Degradation --------------------------------------------------------

    #[test]
    fn no_audio_tracks_rates_medium_not_low() {
        let info = info_1080p(12_000, vec![]);
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::Medium);
        assert!(!score.needs_upgrade);
    }

    #[test]
    fn unknown_video_bitrate_rates_medium_with_issue() {
        let info = MediaTechInfo {
            resolution: Some("1080p".into()),
            video_codec: Some("h264".into()),
            video_bitrate_kbps: None,
            audio_tracks: vec![aac_stereo(192)],
        };
        let score = classify(&info, &thresholds());
        assert_eq!(score.tier_quality, TierQuality::Medium);
        assert!(score.issues.iter().any(|i| i.contains("unknown")));
    }

    // -- Monotonicity property ----------------------------------------------

    #[test]
    fn increasing_video_bitrate_never_decreases_tier_quality() {
        let mut previous = TierQuality::Low;
        for kbps in (500..30_000).step_by(500) {
            let info = info_1080p(kbps, vec![aac_stereo(192)]);
            let score = classify(&info, &thresholds());
            assert!(
                score.tier_quality >= previous,
                "quality regressed at {kbps} kbps"
            );
            previous = score.tier_quality;
        }
    }

    #[test]
    fn tier_string_roundtrip() {
        for tier in [
            ResolutionTier::Sd,
            ResolutionTier::Hd720,
            ResolutionTier::Hd1080,
            ResolutionTier::Uhd4k,
        ] {
            assert_eq!(ResolutionTier::parse(tier.as_str()), Some(tier));
        }
        for q in [TierQuality::Low, TierQuality::Medium, TierQuality::High] {
            assert_eq!(TierQuality::parse(q.as_str()), Some(q));
        }
    }
}
