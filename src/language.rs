//! Recognized languages, their voices and default speech rates.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::info;

use crate::error::SettingsError;

/// Language used when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "en-US";
/// Rate used for codes without an entry in the table.
pub const DEFAULT_RATE: u32 = 160;
pub const MIN_RATE: u32 = 50;
pub const MAX_RATE: u32 = 300;

/// One recognized language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub voices: &'static [&'static str],
    /// Default speech rate in words per minute.
    pub rate: u32,
}

const fn lang(
    code: &'static str,
    name: &'static str,
    voices: &'static [&'static str],
    rate: u32,
) -> Language {
    Language {
        code,
        name,
        voices,
        rate,
    }
}

/// Every language the assistant accepts, sorted by code.
pub static LANGUAGES: &[Language] = &[
    lang("ar-001", "Arabic (Majed)", &["Maged", "Laila"], 140),
    lang("bg-BG", "Bulgarian", &["Daria"], 140),
    lang("ca-ES", "Catalan", &["Montse"], 150),
    lang("cs-CZ", "Czech", &["Zuzana"], 140),
    lang("da-DK", "Danish", &["Sara"], 160),
    lang("de-DE", "German (Germany)", &["Shelley", "Eddy", "Anna"], 160),
    lang("el-GR", "Greek", &["Melina"], 150),
    lang("en-AU", "English (Australia)", &["Karen"], 180),
    lang("en-GB", "English (UK)", &["Shelley", "Daniel", "Flo"], 180),
    lang("en-IE", "English (Ireland)", &["Moira"], 180),
    lang("en-IN", "English (India)", &["Rishi"], 180),
    lang("en-US", "English (US)", &["Samantha", "Alex"], 180),
    lang("en-ZA", "English (South Africa)", &["Tessa"], 180),
    lang("es-ES", "Spanish (Spain)", &["Monica", "Diego"], 150),
    lang("es-MX", "Spanish (Mexico)", &["Paulina", "Monica", "Diego"], 150),
    lang("fi-FI", "Finnish", &["Satu", "Shelley"], 150),
    lang("fr-CA", "French (Canada)", &["Amelie", "Shelley"], 150),
    lang("fr-FR", "French (France)", &["Thomas", "Audrey"], 150),
    lang("he-IL", "Hebrew", &["Carmit"], 140),
    lang("hi-IN", "Hindi", &["Lekha", "Rishi"], 130),
    lang("hr-HR", "Croatian", &["Lana"], 140),
    lang("hu-HU", "Hungarian", &["Tünde"], 150),
    lang("id-ID", "Indonesian", &["Damayanti"], 150),
    lang("it-IT", "Italian", &["Alice", "Shelley"], 150),
    lang("ja-JP", "Japanese", &["Kyoko", "Shelley"], 130),
    lang("ko-KR", "Korean", &["Yuna", "Shelley"], 130),
    lang("ms-MY", "Malay", &["Amira"], 150),
    lang("nb-NO", "Norwegian", &["Nora"], 160),
    lang("nl-BE", "Dutch (Belgium)", &["Ellen"], 160),
    lang("nl-NL", "Dutch (Netherlands)", &["Xander"], 160),
    lang("pl-PL", "Polish", &["Zosia"], 140),
    lang("pt-BR", "Portuguese (Brazil)", &["Luciana", "Shelley"], 150),
    lang("pt-PT", "Portuguese (Portugal)", &["Joana"], 150),
    lang("ro-RO", "Romanian", &["Ioana"], 150),
    lang("ru-RU", "Russian", &["Milena", "Yuri"], 140),
    lang("sk-SK", "Slovak", &["Laura"], 140),
    lang("sl-SI", "Slovenian", &["Tina"], 140),
    lang("sv-SE", "Swedish", &["Alva"], 160),
    lang("ta-IN", "Tamil", &["Vani"], 130),
    lang("th-TH", "Thai", &["Kanya"], 130),
    lang("tr-TR", "Turkish", &["Yelda"], 150),
    lang("uk-UA", "Ukrainian", &["Lesya"], 140),
    lang("vi-VN", "Vietnamese", &["Linh"], 130),
    lang("zh-CN", "Chinese (Mandarin, mainland)", &["Ting-Ting", "Eddy"], 120),
    lang("zh-HK", "Chinese (Hong Kong)", &["Sin-ji"], 120),
    lang("zh-TW", "Chinese (Taiwan)", &["Mei-Jia", "Shelley"], 120),
];

static BY_CODE: Lazy<HashMap<&'static str, &'static Language>> =
    Lazy::new(|| LANGUAGES.iter().map(|l| (l.code, l)).collect());

/// Canonical form of a language tag: underscores become hyphens.
///
/// ```
/// use confidant::language::normalize_language;
/// assert_eq!(normalize_language("en_US"), "en-US");
/// ```
pub fn normalize_language(code: &str) -> String {
    code.trim().replace('_', "-")
}

/// Looks up a language by code, normalizing it first.
pub fn lookup(code: &str) -> Option<&'static Language> {
    BY_CODE.get(normalize_language(code).as_str()).copied()
}

/// Default rate for `code`, or [`DEFAULT_RATE`] when unknown.
pub fn default_rate(code: &str) -> u32 {
    lookup(code).map(|l| l.rate).unwrap_or(DEFAULT_RATE)
}

/// Validates a speech rate in words per minute.
pub fn check_rate(rate: i64) -> Result<u32, SettingsError> {
    if rate < i64::from(MIN_RATE) || rate > i64::from(MAX_RATE) {
        return Err(SettingsError::RateOutOfRange {
            rate,
            min: MIN_RATE,
            max: MAX_RATE,
        });
    }
    Ok(rate as u32)
}

/// Speech-related runtime settings shared by request handlers.
#[derive(Debug)]
pub struct Settings {
    language: RwLock<&'static Language>,
    rates: RwLock<HashMap<String, u32>>,
}

impl Settings {
    /// Creates settings with `language` selected, falling back to
    /// [`DEFAULT_LANGUAGE`] when it is not recognized.
    pub fn new(language: &str) -> Self {
        let selected = lookup(language)
            .or_else(|| lookup(DEFAULT_LANGUAGE))
            .unwrap_or(&LANGUAGES[0]);
        Self {
            language: RwLock::new(selected),
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// The currently selected language.
    pub fn language(&self) -> &'static Language {
        match self.language.read() {
            Ok(l) => *l,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Selects a new language, rejecting unknown codes.
    pub fn set_language(&self, code: &str) -> Result<&'static Language, SettingsError> {
        let selected = lookup(code)
            .ok_or_else(|| SettingsError::UnsupportedLanguage(normalize_language(code)))?;
        match self.language.write() {
            Ok(mut l) => *l = selected,
            Err(poisoned) => *poisoned.into_inner() = selected,
        }
        info!(language = selected.code, "language changed");
        Ok(selected)
    }

    /// Effective speech rate for `code`, honoring overrides.
    pub fn rate(&self, code: &str) -> u32 {
        let code = normalize_language(code);
        let overridden = match self.rates.read() {
            Ok(r) => r.get(&code).copied(),
            Err(poisoned) => poisoned.into_inner().get(&code).copied(),
        };
        overridden.unwrap_or_else(|| default_rate(&code))
    }

    /// Overrides the speech rate for a recognized language.
    pub fn set_rate(&self, code: &str, rate: i64) -> Result<u32, SettingsError> {
        let language = lookup(code)
            .ok_or_else(|| SettingsError::UnsupportedLanguage(normalize_language(code)))?;
        let rate = check_rate(rate)?;
        match self.rates.write() {
            Ok(mut r) => r.insert(language.code.to_string(), rate),
            Err(poisoned) => poisoned.into_inner().insert(language.code.to_string(), rate),
        };
        info!(language = language.code, rate, "speech rate changed");
        Ok(rate)
    }

    /// Effective rate for every recognized language.
    pub fn rates(&self) -> BTreeMap<&'static str, u32> {
        LANGUAGES.iter().map(|l| (l.code, self.rate(l.code))).collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}
