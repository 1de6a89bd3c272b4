//! Messages a game client sends on the session socket.

use crate::message::Fields;
use crate::ProtocolError;

/// One session-socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    /// `i`: own player info.
    Info,
    /// `name`: set the display name.
    Name(String),
    /// `ploc`: previous map id and location breadcrumb.
    PreviousLocation {
        prev_map_id: String,
        prev_locations: String,
    },
    /// `lcol`: location colour metadata.
    LocationColors {
        location: String,
        fg_color: String,
        bg_color: String,
    },
    /// `gsay`: global chat. Location fields are sent unless disabled.
    GlobalSay { text: String, enable_location: bool },
    /// `psay`: party chat.
    PartySay(String),
    /// `l`: entered one or more named locations.
    Locations(Vec<String>),
    /// `pf`: friends list.
    Friends,
    /// `pt`: party state.
    Party,
    /// `ep`: active event period.
    EventPeriod,
    /// `e`: event list.
    Events,
    /// `eexp`: expedition points.
    ExpeditionPoints,
    /// `eec`: claim an expedition.
    ClaimExpedition(String),
    /// `pr`: private mode toggle.
    PrivateMode(bool),
}

impl SessionRequest {
    /// Parses one message.
    pub fn parse(mut fields: Fields<'_>) -> Result<Self, ProtocolError> {
        let request = match fields.tag() {
            "i" => Self::Info,
            "name" => Self::Name(fields.next_str("name")?.to_string()),
            "ploc" => Self::PreviousLocation {
                prev_map_id: fields.next_str("prevMapId")?.to_string(),
                prev_locations: fields.next_str("prevLocations")?.to_string(),
            },
            "lcol" => Self::LocationColors {
                location: fields.next_str("location")?.to_string(),
                fg_color: fields.next_str("fgColor")?.to_string(),
                bg_color: fields.next_str("bgColor")?.to_string(),
            },
            "gsay" => Self::GlobalSay {
                text: fields.next_str("text")?.to_string(),
                enable_location: fields.opt_flag("enableLocation")?.unwrap_or(true),
            },
            "psay" => Self::PartySay(fields.next_str("text")?.to_string()),
            "l" => {
                return Ok(Self::Locations(
                    fields.remaining().into_iter().map(str::to_string).collect(),
                ));
            }
            "pf" => Self::Friends,
            "pt" => Self::Party,
            "ep" => Self::EventPeriod,
            "e" => Self::Events,
            "eexp" => Self::ExpeditionPoints,
            "eec" => Self::ClaimExpedition(fields.next_str("eventId")?.to_string()),
            "pr" => Self::PrivateMode(fields.next_flag("private")?),
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        };
        fields.finish()?;
        Ok(request)
    }

    /// The wire tag this request was parsed from.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "i",
            Self::Name(_) => "name",
            Self::PreviousLocation { .. } => "ploc",
            Self::LocationColors { .. } => "lcol",
            Self::GlobalSay { .. } => "gsay",
            Self::PartySay(_) => "psay",
            Self::Locations(_) => "l",
            Self::Friends => "pf",
            Self::Party => "pt",
            Self::EventPeriod => "ep",
            Self::Events => "e",
            Self::ExpeditionPoints => "eexp",
            Self::ClaimExpedition(_) => "eec",
            Self::PrivateMode(_) => "pr",
        }
    }

    /// Whether handling this request counts as game activity.
    pub fn marks_activity(&self) -> bool {
        matches!(
            self,
            Self::GlobalSay { .. } | Self::PartySay(_) | Self::Locations(_) | Self::PrivateMode(_)
        )
    }
}
