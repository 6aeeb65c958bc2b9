// i18n.rs: UI strings
//
// Built-in strings come from assets/i18n.json ({ "<lang>": { "key": "value" } }),
// compiled into the binary. A file i18n/<lang>.json next to the executable or in
// the working directory overrides individual keys. Lookup falls back to English,
// then to the key itself.

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

const BUILTIN: &str = include_str!("../assets/i18n.json");
const FALLBACK_LANG: &str = "en";

pub const LANGUAGES: [(&str, &str); 4] = [
    ("en", "English"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("es", "Español"),
];

#[derive(Debug, Clone)]
struct I18n {
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn builtin_map(lang: &str) -> HashMap<String, String> {
    let all: HashMap<String, HashMap<String, String>> = match serde_json::from_str(BUILTIN) {
        Ok(all) => all,
        Err(err) => {
            log::error!("built-in translations are invalid: {err}");
            return HashMap::new();
        }
    };
    all.get(lang).cloned().unwrap_or_default()
}

fn override_file(lang: &str) -> Option<PathBuf> {
    let file = format!("{lang}.json");
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    exe_dir
        .into_iter()
        .chain(std::iter::once(PathBuf::from(".")))
        .map(|dir| dir.join("i18n").join(&file))
        .find(|p| p.exists())
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    let mut map = builtin_map(lang);
    if let Some(path) = override_file(lang) {
        let parsed = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<HashMap<String, String>>(&text).ok());
        match parsed {
            Some(extra) => {
                log::debug!("translations for {lang} overridden by {path:?}");
                map.extend(extra);
            }
            None => log::warn!("ignoring unreadable translation file {path:?}"),
        }
    }
    map
}

/// Selects the UI language. Safe to call again when the user switches.
pub fn init(lang: &str) {
    let i = I18n {
        map: load_lang(lang),
        fallback_map: load_lang(FALLBACK_LANG),
    };

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else {
        let _ = I18N.set(RwLock::new(i));
    }
}

/// Localized text for `key`, or the key itself when nothing matches.
pub fn tr(key: &str) -> String {
    let Some(i) = I18N.get().and_then(|l| l.read().ok()) else {
        return key.to_string();
    };
    i.map
        .get(key)
        .or_else(|| i.fallback_map.get(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

/// Like [`tr`], substituting `{name}` placeholders.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    let mut s = tr(key);
    for (k, v) in args {
        s = s.replace(&format!("{{{k}}}"), v);
    }
    s
}

/// `--lang <code>`, then `PANORAMA_TOUR_LANG`, then English.
pub fn resolve_lang(cli: Option<&str>) -> String {
    if let Some(lang) = cli {
        return lang.to_string();
    }
    match std::env::var("PANORAMA_TOUR_LANG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => FALLBACK_LANG.to_string(),
    }
}
