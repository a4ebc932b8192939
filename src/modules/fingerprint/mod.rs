//! Browser fingerprint profiles.
//!
//! A fixed catalog of locale/timezone/viewport combinations. One profile is
//! drawn per browser context, and mobile viewports are only ever paired with
//! mobile user agents so the page never sees a phone-sized desktop browser.

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;

use super::user_agents::is_mobile_user_agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintProfile {
    pub locale: &'static str,
    pub accept_language: &'static str,
    pub timezone_id: &'static str,
    pub viewport: Viewport,
    pub mobile: bool,
}

impl FingerprintProfile {
    const fn new(
        locale: &'static str,
        accept_language: &'static str,
        timezone_id: &'static str,
        width: u32,
        height: u32,
        mobile: bool,
    ) -> Self {
        Self {
            locale,
            accept_language,
            timezone_id,
            viewport: Viewport { width, height },
            mobile,
        }
    }

    /// Languages advertised through `navigator.languages`.
    pub fn languages(&self) -> Vec<&'static str> {
        let primary = self.locale;
        let base = primary.split('-').next().unwrap_or(primary);
        if base == primary {
            vec![primary]
        } else {
            vec![primary, base]
        }
    }
}

pub static FINGERPRINT_CATALOG: &[FingerprintProfile] = &[
    FingerprintProfile::new("en-US", "en-US,en;q=0.9", "America/New_York", 1366, 768, false),
    FingerprintProfile::new("en-GB", "en-GB,en;q=0.9", "Europe/London", 1920, 1080, false),
    FingerprintProfile::new("de-DE", "de-DE,de;q=0.9", "Europe/Berlin", 1440, 900, false),
    FingerprintProfile::new("en-KE", "en-KE,en;q=0.9", "Africa/Nairobi", 1536, 864, false),
    FingerprintProfile::new("en-US", "en-US,en;q=0.9", "America/Chicago", 390, 844, true),
    FingerprintProfile::new("en-KE", "en-KE,en;q=0.9", "Africa/Nairobi", 412, 915, true),
];

/// Picks a random profile whose form factor matches `user_agent`.
pub fn choose_profile(user_agent: &str) -> FingerprintProfile {
    choose_from(FINGERPRINT_CATALOG, is_mobile_user_agent(user_agent))
}

fn choose_from(catalog: &[FingerprintProfile], mobile: bool) -> FingerprintProfile {
    let candidates: Vec<&FingerprintProfile> = catalog
        .iter()
        .filter(|profile| profile.mobile == mobile)
        .collect();
    candidates
        .choose(&mut thread_rng())
        .map(|profile| (*profile).clone())
        .unwrap_or_else(|| FINGERPRINT_CATALOG[0].clone())
}
