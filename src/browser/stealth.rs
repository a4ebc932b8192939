//! Init script that hides the usual automation tells.

use crate::modules::fingerprint::FingerprintProfile;

/// Script installed on every new document of a session. It masks
/// `navigator.webdriver`, aligns `navigator.languages` with the session
/// locale, fakes a plugin list and provides `window.chrome`.
pub fn init_script(profile: &FingerprintProfile) -> String {
    let languages = profile
        .languages()
        .iter()
        .map(|lang| format!("'{lang}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let max_touch_points = if profile.mobile { 5 } else { 0 };

    format!(
        r#"(() => {{
    Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
    Object.defineProperty(navigator, 'languages', {{ get: () => [{languages}] }});
    Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
    Object.defineProperty(navigator, 'maxTouchPoints', {{ get: () => {max_touch_points} }});
    window.chrome = window.chrome || {{ runtime: {{}} }};
}})();"#
    )
}
