//! Lead status taxonomy and reaction-symbol resolution.
//!
//! Moderators mark a lead by reacting to its inbound message. The same glyph
//! reaches us in several encodings: a precomposed emoji codepoint, a text
//! glyph followed by a variation selector, a skin-tone variant, or a
//! `:shortcode:` name. Every symbol goes through [`normalize_symbol`] once and
//! is then looked up in a single table, so adding an encoding never means
//! touching a string-equality chain.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Canonical lead status. Serialized as kebab-case (`sold-booked`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    #[default]
    New,
    Called,
    DidNotAnswer,
    SoldBooked,
    DoNotCall,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Called,
        LeadStatus::DidNotAnswer,
        LeadStatus::SoldBooked,
        LeadStatus::DoNotCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Called => "called",
            LeadStatus::DidNotAnswer => "did-not-answer",
            LeadStatus::SoldBooked => "sold-booked",
            LeadStatus::DoNotCall => "do-not-call",
        }
    }

    /// Precedence when several recognized reactions sit on one message.
    /// A sale or a firm do-not-call outranks a soft contact outcome.
    pub fn priority(&self) -> u8 {
        match self {
            LeadStatus::SoldBooked => 3,
            LeadStatus::DoNotCall => 2,
            LeadStatus::Called | LeadStatus::DidNotAnswer => 1,
            LeadStatus::New => 0,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    /// Accepts the canonical labels plus the historical ones still found in
    /// older databases (`sold/booked`, `set/sale`, `uncalled`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['_', ' '], "-");
        match key.as_str() {
            "new" | "uncalled" | "" => Ok(LeadStatus::New),
            "called" => Ok(LeadStatus::Called),
            "did-not-answer" | "no-answer" | "dna" => Ok(LeadStatus::DidNotAnswer),
            "sold-booked" | "sold/booked" | "set/sale" | "sold" | "booked" => {
                Ok(LeadStatus::SoldBooked)
            }
            "do-not-call" | "dnc" => Ok(LeadStatus::DoNotCall),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Symbol normalization
// ---------------------------------------------------------------------------

const VARIATION_SELECTOR_TEXT: char = '\u{FE0E}';
const VARIATION_SELECTOR_EMOJI: char = '\u{FE0F}';

fn is_skin_tone_modifier(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

/// Reduce a reaction symbol to its lookup key.
///
/// Shortcodes (`:fire:`) are lowercased. Glyphs are NFC-normalized with
/// variation selectors and skin-tone modifiers stripped, so `✔`, `✔️` and
/// `✔︎` all collapse to the same key.
pub fn normalize_symbol(symbol: &str) -> String {
    let trimmed = symbol.trim();
    if trimmed.len() > 2 && trimmed.starts_with(':') && trimmed.ends_with(':') {
        return trimmed.to_lowercase();
    }
    trimmed
        .nfc()
        .filter(|c| {
            *c != VARIATION_SELECTOR_TEXT
                && *c != VARIATION_SELECTOR_EMOJI
                && !is_skin_tone_modifier(*c)
        })
        .collect()
}

/// Every encoding we have seen moderators use, keyed by raw form.
/// Entries are normalized when the table is built.
const SYMBOL_TABLE: &[(&str, LeadStatus)] = &[
    // sold / booked
    ("\u{1F525}", LeadStatus::SoldBooked), // fire
    (":fire:", LeadStatus::SoldBooked),
    ("\u{1F4B0}", LeadStatus::SoldBooked), // money bag
    (":moneybag:", LeadStatus::SoldBooked),
    ("\u{1F911}", LeadStatus::SoldBooked), // money-mouth face
    (":money_mouth:", LeadStatus::SoldBooked),
    (":money_mouth_face:", LeadStatus::SoldBooked),
    // called
    ("\u{2705}", LeadStatus::Called), // white heavy check mark
    (":white_check_mark:", LeadStatus::Called),
    ("\u{2714}", LeadStatus::Called), // heavy check mark (text glyph)
    (":heavy_check_mark:", LeadStatus::Called),
    ("\u{2611}", LeadStatus::Called), // ballot box with check
    (":ballot_box_with_check:", LeadStatus::Called),
    ("\u{1F4DE}", LeadStatus::Called), // telephone receiver
    (":telephone_receiver:", LeadStatus::Called),
    ("\u{260E}", LeadStatus::Called), // black telephone
    (":telephone:", LeadStatus::Called),
    ("\u{1F44D}", LeadStatus::Called), // thumbs up
    (":thumbsup:", LeadStatus::Called),
    (":+1:", LeadStatus::Called),
    // did not answer
    ("\u{1F4F5}", LeadStatus::DidNotAnswer), // no mobile phones
    (":no_mobile_phones:", LeadStatus::DidNotAnswer),
    ("\u{1F515}", LeadStatus::DidNotAnswer), // bell with slash
    (":no_bell:", LeadStatus::DidNotAnswer),
    ("\u{23F3}", LeadStatus::DidNotAnswer), // hourglass with flowing sand
    (":hourglass_flowing_sand:", LeadStatus::DidNotAnswer),
    // do not call
    ("\u{274C}", LeadStatus::DoNotCall), // cross mark
    (":x:", LeadStatus::DoNotCall),
    ("\u{2716}", LeadStatus::DoNotCall), // heavy multiplication x
    (":heavy_multiplication_x:", LeadStatus::DoNotCall),
    ("\u{1F6AB}", LeadStatus::DoNotCall), // prohibited
    (":no_entry_sign:", LeadStatus::DoNotCall),
    ("\u{26D4}", LeadStatus::DoNotCall), // no entry
    (":no_entry:", LeadStatus::DoNotCall),
];

fn symbol_table() -> &'static HashMap<String, LeadStatus> {
    static TABLE: OnceLock<HashMap<String, LeadStatus>> = OnceLock::new();
    TABLE.get_or_init(|| {
        SYMBOL_TABLE
            .iter()
            .map(|(raw, status)| (normalize_symbol(raw), *status))
            .collect()
    })
}

/// Resolve a reaction symbol to the status it denotes.
///
/// Returns `None` for symbols that carry no status; that is an ordinary
/// outcome (people react with all sorts of things), not an error.
pub fn resolve_symbol(symbol: &str) -> Option<LeadStatus> {
    let key = normalize_symbol(symbol);
    if key.is_empty() {
        return None;
    }
    symbol_table().get(&key).copied()
}

// ---------------------------------------------------------------------------
// Tie-break across several reactions
// ---------------------------------------------------------------------------

/// Winning status for a message together with the agent it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: LeadStatus,
    pub agent: String,
}

/// Pick the winning status from votes given in reaction order.
///
/// Higher [`LeadStatus::priority`] wins. Among equal priorities the later
/// vote wins, matching "most recent reaction counts".
pub fn decide<I>(votes: I) -> Option<Verdict>
where
    I: IntoIterator<Item = Verdict>,
{
    let mut winner: Option<Verdict> = None;
    for vote in votes {
        let replace = match &winner {
            None => true,
            Some(current) => vote.status.priority() >= current.status.priority(),
        };
        if replace {
            winner = Some(vote);
        }
    }
    winner
}
