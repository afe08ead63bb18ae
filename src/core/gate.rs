use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::Result;
use crate::core::centering::{CenteringEvaluator, Offset};
use crate::core::detector::{Detection, FrameDimensions};

/// Minimum confidence plus centering requirement for a sample to pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub min_score: f32,
    #[serde(default = "default_true")]
    pub require_centered: bool,
}

fn default_true() -> bool { true }

impl ThresholdProfile {
    /// Live hinting while the user lines up.
    pub const FEEDBACK: Self = Self { min_score: 0.5, require_centered: true };
    /// Explicit enrollment commit.
    pub const CAPTURE: Self = Self { min_score: 0.7, require_centered: true };
    /// Login auto-accept.
    pub const LOGIN: Self = Self { min_score: 0.75, require_centered: true };

    fn feedback() -> Self { Self::FEEDBACK }
    fn capture() -> Self { Self::CAPTURE }
    fn login() -> Self { Self::LOGIN }
}

/// The three named profiles, loaded once from config and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default = "ThresholdProfile::feedback")]
    pub feedback: ThresholdProfile,
    #[serde(default = "ThresholdProfile::capture")]
    pub capture: ThresholdProfile,
    #[serde(default = "ThresholdProfile::login")]
    pub login: ThresholdProfile,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            feedback: ThresholdProfile::FEEDBACK,
            capture: ThresholdProfile::CAPTURE,
            login: ThresholdProfile::LOGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NoFace,
    LowConfidence { score: f32, min_score: f32 },
    NotCentered { offsets: Vec<Offset> },
}

impl RejectReason {
    /// What the user should do about it.
    pub fn guidance(&self) -> String {
        match self {
            RejectReason::NoFace => "Position your face in view of the camera".to_string(),
            RejectReason::LowConfidence { .. } => {
                "Move closer to the camera or improve lighting".to_string()
            }
            RejectReason::NotCentered { offsets } if offsets.is_empty() => {
                "Center your face in the camera view".to_string()
            }
            RejectReason::NotCentered { offsets } => {
                let moves: Vec<&str> = offsets.iter().map(|o| o.correction()).collect();
                format!("Move {}", moves.join(" and "))
            }
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoFace => write!(f, "no face found"),
            RejectReason::LowConfidence { .. } => write!(f, "confidence below threshold"),
            RejectReason::NotCentered { .. } => write!(f, "face not centered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }
}

/// Single accept/reject rule shared by live feedback, enrollment commit and
/// login. Callers differ only in the profile they pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptanceGate {
    centering: CenteringEvaluator,
}

impl AcceptanceGate {
    pub fn new(centering: CenteringEvaluator) -> Self {
        Self { centering }
    }

    pub fn evaluate(
        &self,
        detection: Option<&Detection>,
        frame: FrameDimensions,
        profile: &ThresholdProfile,
    ) -> Result<Verdict> {
        let detection = match detection {
            Some(d) => d,
            None => return Ok(Verdict::Rejected(RejectReason::NoFace)),
        };

        // NaN scores fail this comparison.
        if !(detection.score >= profile.min_score) {
            return Ok(Verdict::Rejected(RejectReason::LowConfidence {
                score: detection.score,
                min_score: profile.min_score,
            }));
        }

        if profile.require_centered {
            let bbox = &detection.bounding_box;
            if !self.centering.is_centered(bbox, frame)? {
                let offsets = self.centering.offsets(bbox, frame)?;
                return Ok(Verdict::Rejected(RejectReason::NotCentered { offsets }));
            }
        }

        Ok(Verdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CaptureError;
    use crate::core::detector::BoundingBox;

    const FRAME: FrameDimensions = FrameDimensions { width: 640, height: 480 };
    const PROFILES: [ThresholdProfile; 3] = [
        ThresholdProfile::FEEDBACK,
        ThresholdProfile::CAPTURE,
        ThresholdProfile::LOGIN,
    ];

    fn centered(score: f32) -> Detection {
        Detection {
            embedding: vec![0.0; 128],
            bounding_box: BoundingBox::new(270.0, 190.0, 100.0, 100.0),
            score,
        }
    }

    #[test]
    fn feedback_accepts_moderate_centered_face() {
        let gate = AcceptanceGate::default();
        let verdict = gate
            .evaluate(Some(&centered(0.6)), FRAME, &ThresholdProfile::FEEDBACK)
            .unwrap();
        assert_eq!(verdict, Verdict::Accepted);
    }

    #[test]
    fn login_rejects_same_face_for_low_score() {
        let gate = AcceptanceGate::default();
        let verdict = gate
            .evaluate(Some(&centered(0.6)), FRAME, &ThresholdProfile::LOGIN)
            .unwrap();
        assert!(matches!(verdict, Verdict::Rejected(RejectReason::LowConfidence { .. })));
        assert_eq!(verdict.reason().unwrap().to_string(), "confidence below threshold");
    }

    #[test]
    fn missing_face_is_rejected_under_every_profile() {
        let gate = AcceptanceGate::default();
        for profile in PROFILES {
            let verdict = gate.evaluate(None, FRAME, &profile).unwrap();
            assert_eq!(verdict, Verdict::Rejected(RejectReason::NoFace));
            assert_eq!(verdict.reason().unwrap().to_string(), "no face found");
        }
    }

    #[test]
    fn face_at_frame_edge_is_rejected_when_centering_required() {
        let gate = AcceptanceGate::default();
        let mut detection = centered(0.8);
        detection.bounding_box = BoundingBox::new(-50.0, 190.0, 100.0, 100.0);

        for profile in PROFILES {
            let verdict = gate.evaluate(Some(&detection), FRAME, &profile).unwrap();
            assert_eq!(verdict.reason().unwrap().to_string(), "face not centered");
        }
    }

    #[test]
    fn low_score_wins_over_good_centering() {
        let gate = AcceptanceGate::default();
        for profile in PROFILES {
            let detection = centered(profile.min_score - 0.01);
            let verdict = gate.evaluate(Some(&detection), FRAME, &profile).unwrap();
            assert!(!verdict.is_accepted());
        }
    }

    #[test]
    fn accepts_iff_score_and_centering_hold() {
        let gate = AcceptanceGate::default();
        let boxes = [
            (BoundingBox::new(270.0, 190.0, 100.0, 100.0), true),
            (BoundingBox::new(560.0, 190.0, 80.0, 100.0), false),
            (BoundingBox::new(270.0, 440.0, 100.0, 40.0), false),
        ];
        let scores = [0.0, 0.49, 0.5, 0.69, 0.7, 0.74, 0.75, 0.9, 1.0];

        for base in PROFILES {
            for require_centered in [true, false] {
                let profile = ThresholdProfile { require_centered, ..base };
                for (bbox, is_centered) in boxes {
                    for score in scores {
                        let detection = Detection {
                            embedding: vec![],
                            bounding_box: bbox,
                            score,
                        };
                        let expected =
                            score >= profile.min_score && (!require_centered || is_centered);
                        let verdict = gate.evaluate(Some(&detection), FRAME, &profile).unwrap();
                        assert_eq!(verdict.is_accepted(), expected, "{:?} {:?}", profile, detection);
                    }
                }
            }
        }
    }

    #[test]
    fn zero_frame_fails_only_when_centering_is_checked() {
        let gate = AcceptanceGate::default();
        let frame = FrameDimensions::new(0, 0);
        let result = gate.evaluate(Some(&centered(0.9)), frame, &ThresholdProfile::CAPTURE);
        assert!(matches!(result, Err(CaptureError::InvalidFrame { .. })));

        let relaxed = ThresholdProfile { require_centered: false, ..ThresholdProfile::CAPTURE };
        assert!(gate.evaluate(Some(&centered(0.9)), frame, &relaxed).unwrap().is_accepted());
    }

    #[test]
    fn not_centered_guidance_names_the_way_to_move() {
        for (offset, hint) in [
            (Offset::Left, "Move right"),
            (Offset::Right, "Move left"),
            (Offset::Up, "Move down"),
            (Offset::Down, "Move up"),
        ] {
            let reason = RejectReason::NotCentered { offsets: vec![offset] };
            assert_eq!(reason.guidance(), hint);
        }

        let corner = RejectReason::NotCentered { offsets: vec![Offset::Left, Offset::Down] };
        assert_eq!(corner.guidance(), "Move right and up");
    }

    #[test]
    fn nan_score_is_rejected_under_every_profile() {
        let gate = AcceptanceGate::default();
        for profile in PROFILES {
            let verdict = gate.evaluate(Some(&centered(f32::NAN)), FRAME, &profile).unwrap();
            assert!(matches!(verdict, Verdict::Rejected(RejectReason::LowConfidence { .. })));
        }
    }

    #[test]
    fn nan_box_is_not_centered() {
        let gate = AcceptanceGate::default();
        let mut detection = centered(0.9);
        detection.bounding_box = BoundingBox::new(f32::NAN, 190.0, 100.0, 100.0);

        let verdict = gate.evaluate(Some(&detection), FRAME, &ThresholdProfile::LOGIN).unwrap();
        assert!(matches!(verdict, Verdict::Rejected(RejectReason::NotCentered { .. })));
        assert_eq!(
            verdict.reason().unwrap().guidance(),
            "Center your face in the camera view"
        );
    }
}
