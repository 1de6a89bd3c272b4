//! Messages a game client sends on the room socket.
//!
//! Parsing only checks shape and numeric syntax. Value ranges are enforced
//! by the room handlers, which own the game rules.

use crate::message::{Fields, WireArg};
use crate::ProtocolError;

/// The 15 numeric parameters shared by `ap` and `mp`, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PictureParams {
    pub position_x: i32,
    pub position_y: i32,
    pub map_x: i32,
    pub map_y: i32,
    pub pan_x: i32,
    pub pan_y: i32,
    pub magnify: i32,
    pub top_trans: i32,
    pub bottom_trans: i32,
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub saturation: i32,
    pub effect_mode: i32,
    pub effect_power: i32,
}

impl PictureParams {
    fn as_array(&self) -> [i32; 15] {
        [
            self.position_x,
            self.position_y,
            self.map_x,
            self.map_y,
            self.pan_x,
            self.pan_y,
            self.magnify,
            self.top_trans,
            self.bottom_trans,
            self.red,
            self.green,
            self.blue,
            self.saturation,
            self.effect_mode,
            self.effect_power,
        ]
    }

    fn parse(fields: &mut Fields<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position_x: fields.next("positionX")?,
            position_y: fields.next("positionY")?,
            map_x: fields.next("mapX")?,
            map_y: fields.next("mapY")?,
            pan_x: fields.next("panX")?,
            pan_y: fields.next("panY")?,
            magnify: fields.next("magnify")?,
            top_trans: fields.next("topTrans")?,
            bottom_trans: fields.next("bottomTrans")?,
            red: fields.next("red")?,
            green: fields.next("green")?,
            blue: fields.next("blue")?,
            saturation: fields.next("saturation")?,
            effect_mode: fields.next("effectMode")?,
            effect_power: fields.next("effectPower")?,
        })
    }
}

impl WireArg for PictureParams {
    fn write_field(&self, out: &mut String) {
        self.as_array().write_field(out);
    }
}

/// One room-socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRequest {
    /// `ident`: identification handshake.
    Ident,
    /// `m` / `tp`: walked or teleported to a tile.
    Move { x: i32, y: i32, teleport: bool },
    /// `f`: facing direction.
    Facing(i32),
    /// `spd`: movement speed.
    Speed(i32),
    /// `spr`: character sprite sheet and index.
    Sprite { name: String, index: i32 },
    /// `fl` / `rfl`: `[r, g, b, power, frames]`.
    Flash { flash: [i32; 5], repeating: bool },
    /// `rrfl`: stop the repeating flash.
    RemoveRepeatingFlash,
    /// `h`: sprite visibility.
    Hidden(bool),
    /// `sys`: system graphic.
    System(String),
    /// `se`: sound effect.
    SoundEffect {
        name: String,
        volume: i32,
        tempo: i32,
        balance: i32,
    },
    /// `ap`: show a picture.
    ShowPicture {
        id: i32,
        params: PictureParams,
        name: String,
        use_transparent_color: bool,
        fixed_to_map: bool,
    },
    /// `mp`: move a shown picture.
    MovePicture {
        id: i32,
        params: PictureParams,
        duration: i32,
    },
    /// `rp`: erase a picture.
    ErasePicture(i32),
    /// `say`: room chat.
    Say(String),
    /// `ss`: switch value report.
    SyncSwitch { id: i32, value: bool },
    /// `sv`: variable value report.
    SyncVariable { id: i32, value: i32 },
    /// `sev`: event action report.
    SyncEvent { id: i32, action: bool },
    /// `sr`: move to another room over the same socket.
    SwitchRoom(u32),
}

impl RoomRequest {
    /// Parses one message.
    pub fn parse(mut fields: Fields<'_>) -> Result<Self, ProtocolError> {
        let tag = fields.tag();
        let request = match tag {
            "ident" => Self::Ident,
            "m" | "tp" => Self::Move {
                x: fields.next("x")?,
                y: fields.next("y")?,
                teleport: tag == "tp",
            },
            "f" => Self::Facing(fields.next("facing")?),
            "spd" => Self::Speed(fields.next("speed")?),
            "spr" => Self::Sprite {
                name: fields.next_str("name")?.to_string(),
                index: fields.next("index")?,
            },
            "fl" | "rfl" => Self::Flash {
                flash: [
                    fields.next("red")?,
                    fields.next("green")?,
                    fields.next("blue")?,
                    fields.next("power")?,
                    fields.next("frames")?,
                ],
                repeating: tag == "rfl",
            },
            "rrfl" => Self::RemoveRepeatingFlash,
            "h" => Self::Hidden(fields.next_flag("hidden")?),
            "sys" => Self::System(fields.next_str("name")?.to_string()),
            "se" => Self::SoundEffect {
                name: fields.next_str("name")?.to_string(),
                volume: fields.next("volume")?,
                tempo: fields.next("tempo")?,
                balance: fields.next("balance")?,
            },
            "ap" => Self::ShowPicture {
                id: fields.next("picId")?,
                params: PictureParams::parse(&mut fields)?,
                name: fields.next_str("name")?.to_string(),
                use_transparent_color: fields.next_flag("useTransparentColor")?,
                fixed_to_map: fields.next_flag("fixedToMap")?,
            },
            "mp" => Self::MovePicture {
                id: fields.next("picId")?,
                params: PictureParams::parse(&mut fields)?,
                duration: fields.next("duration")?,
            },
            "rp" => Self::ErasePicture(fields.next("picId")?),
            "say" => Self::Say(fields.next_str("text")?.to_string()),
            "ss" => Self::SyncSwitch {
                id: fields.next("switchId")?,
                value: fields.next_flag("value")?,
            },
            "sv" => Self::SyncVariable {
                id: fields.next("varId")?,
                value: fields.next("value")?,
            },
            "sev" => Self::SyncEvent {
                id: fields.next("eventId")?,
                action: fields.next_flag("action")?,
            },
            "sr" => Self::SwitchRoom(fields.next("roomId")?),
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        };
        fields.finish()?;
        Ok(request)
    }

    /// The wire tag this request was parsed from.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ident => "ident",
            Self::Move { teleport: false, .. } => "m",
            Self::Move { teleport: true, .. } => "tp",
            Self::Facing(_) => "f",
            Self::Speed(_) => "spd",
            Self::Sprite { .. } => "spr",
            Self::Flash { repeating: false, .. } => "fl",
            Self::Flash { repeating: true, .. } => "rfl",
            Self::RemoveRepeatingFlash => "rrfl",
            Self::Hidden(_) => "h",
            Self::System(_) => "sys",
            Self::SoundEffect { .. } => "se",
            Self::ShowPicture { .. } => "ap",
            Self::MovePicture { .. } => "mp",
            Self::ErasePicture(_) => "rp",
            Self::Say(_) => "say",
            Self::SyncSwitch { .. } => "ss",
            Self::SyncVariable { .. } => "sv",
            Self::SyncEvent { .. } => "sev",
            Self::SwitchRoom(_) => "sr",
        }
    }
}
