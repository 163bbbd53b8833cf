//! Inline button payloads
//!
//! Telegram limits callback data to 64 bytes, so produced files are
//! referenced by registry id rather than by path.

use std::fmt;

use grabcore::RegistryId;

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Profile,
    ConvertPdf,
    TextPdf,
    UpgradePlan,
    KeywordSearch,
    /// Create a payment invoice for this many dollars
    Invoice(f64),
    Audio(RegistryId),
    Gif(RegistryId),
    AdminBroadcast,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "profile" => return Some(CallbackAction::Profile),
            "convertpdf" => return Some(CallbackAction::ConvertPdf),
            "text_pdf" => return Some(CallbackAction::TextPdf),
            "upgrade_plan" => return Some(CallbackAction::UpgradePlan),
            "keyword_search" => return Some(CallbackAction::KeywordSearch),
            "admin_broadcast" => return Some(CallbackAction::AdminBroadcast),
            _ => {}
        }

        let (prefix, arg) = data.split_once(':')?;
        match prefix {
            "invoice" => arg
                .parse::<f64>()
                .ok()
                .filter(|amount| amount.is_finite() && *amount > 0.0)
                .map(CallbackAction::Invoice),
            "audio" => arg.parse().ok().map(CallbackAction::Audio),
            "gif" => arg.parse().ok().map(CallbackAction::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Profile => write!(f, "profile"),
            CallbackAction::ConvertPdf => write!(f, "convertpdf"),
            CallbackAction::TextPdf => write!(f, "text_pdf"),
            CallbackAction::UpgradePlan => write!(f, "upgrade_plan"),
            CallbackAction::KeywordSearch => write!(f, "keyword_search"),
            CallbackAction::Invoice(amount) => write!(f, "invoice:{}", amount),
            CallbackAction::Audio(id) => write!(f, "audio:{}", id),
            CallbackAction::Gif(id) => write!(f, "gif:{}", id),
            CallbackAction::AdminBroadcast => write!(f, "admin_broadcast"),
        }
    }
}
