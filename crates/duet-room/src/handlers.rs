//! Room-socket message handlers.

use std::sync::Arc;

use duet_protocol::{message, Fields, PictureParams, ProtocolError, RoomRequest};
use duet_session::logging::error_log;
use duet_session::{chat_text, Services};

use crate::client::{Picture, RoomClient, MAX_PICTURES};
use crate::{RoomError, Rooms};

/// Highest sprite index in a character sheet.
const MAX_SPRITE_INDEX: i32 = 7;

impl<S: Services> Rooms<S> {
    /// Parses one message and applies it to `client` and its room.
    pub(crate) async fn dispatch(
        &self,
        client: &Arc<RoomClient<S>>,
        fields: Fields<'_>,
    ) -> Result<(), RoomError> {
        let request = RoomRequest::parse(fields)?;

        if !client.is_valid() {
            return match request {
                RoomRequest::Ident => {
                    client.set_valid();
                    client.room().resync(client).await;
                    Ok(())
                }
                other => Err(ProtocolError::NotIdentified(other.tag().to_string()).into()),
            };
        }

        let id = client.session().id();
        let room = client.room();

        match request {
            // Already valid.
            RoomRequest::Ident => {}
            RoomRequest::Move { x, y, teleport } => {
                if x < 0 || y < 0 {
                    return Err(RoomError::InvalidValue("position"));
                }
                client.with_state(|s| {
                    s.x = x;
                    s.y = y;
                });
                let tag = if teleport { "tp" } else { "m" };
                room.broadcast(client.connection_id(), &message!(tag, id, x, y));
            }
            RoomRequest::Facing(facing) => {
                if !(0..=3).contains(&facing) {
                    return Err(RoomError::InvalidValue("facing"));
                }
                client.with_state(|s| s.facing = facing);
                room.broadcast(client.connection_id(), &message!("f", id, facing));
            }
            RoomRequest::Speed(speed) => {
                if !(0..=10).contains(&speed) {
                    return Err(RoomError::InvalidValue("speed"));
                }
                client.with_state(|s| s.speed = speed);
                room.broadcast(client.connection_id(), &message!("spd", id, speed));
            }
            RoomRequest::Sprite { name, index } => {
                if !(-1..=MAX_SPRITE_INDEX).contains(&index) {
                    return Err(RoomError::InvalidValue("index"));
                }
                client.session().set_sprite(&name, index);
                room.broadcast(client.connection_id(), &message!("spr", id, name, index));
            }
            RoomRequest::Flash { flash, repeating } => {
                if flash.iter().any(|v| !(0..=255).contains(v)) {
                    return Err(RoomError::InvalidValue("flash"));
                }
                client.with_state(|s| {
                    s.flash = flash;
                    if repeating {
                        s.repeating_flash = true;
                    }
                });
                let tag = if repeating { "rfl" } else { "fl" };
                room.broadcast(client.connection_id(), &message!(tag, id, flash));
            }
            RoomRequest::RemoveRepeatingFlash => {
                client.with_state(|s| {
                    s.repeating_flash = false;
                    s.flash = [0; 5];
                });
                room.broadcast(client.connection_id(), &message!("rrfl", id));
            }
            RoomRequest::Hidden(hidden) => {
                client.with_state(|s| s.hidden = hidden);
                room.broadcast(client.connection_id(), &message!("h", id, hidden));
            }
            RoomRequest::System(name) => {
                client.session().set_system(&name);
                room.broadcast(client.connection_id(), &message!("sys", id, name));
            }
            RoomRequest::SoundEffect {
                name,
                volume,
                tempo,
                balance,
            } => {
                if !(0..=100).contains(&volume) {
                    return Err(RoomError::InvalidValue("volume"));
                }
                if !(10..=400).contains(&tempo) {
                    return Err(RoomError::InvalidValue("tempo"));
                }
                if !(0..=100).contains(&balance) {
                    return Err(RoomError::InvalidValue("balance"));
                }
                room.broadcast(
                    client.connection_id(),
                    &message!("se", id, name, volume, tempo, balance),
                );
            }
            RoomRequest::ShowPicture {
                id: pic_id,
                params,
                name,
                use_transparent_color,
                fixed_to_map,
            } => {
                check_picture_id(pic_id)?;
                let msg = message!(
                    "ap",
                    id,
                    pic_id,
                    params,
                    name.as_str(),
                    use_transparent_color,
                    fixed_to_map,
                );
                client.with_state(|s| {
                    s.pictures.insert(
                        pic_id,
                        Picture {
                            name,
                            params,
                            use_transparent_color,
                            fixed_to_map,
                        },
                    )
                });
                room.broadcast(client.connection_id(), &msg);
            }
            RoomRequest::MovePicture {
                id: pic_id,
                params,
                duration,
            } => {
                check_picture_id(pic_id)?;
                move_picture(client, pic_id, params)?;
                room.broadcast(
                    client.connection_id(),
                    &message!("mp", id, pic_id, params, duration),
                );
            }
            RoomRequest::ErasePicture(pic_id) => {
                check_picture_id(pic_id)?;
                client.with_state(|s| s.pictures.remove(&pic_id));
                room.broadcast(client.connection_id(), &message!("rp", id, pic_id));
            }
            RoomRequest::Say(text) => {
                let text = chat_text(client.session(), &text)?;
                room.broadcast(client.connection_id(), &message!("say", id, text));
            }
            RoomRequest::SyncSwitch { id: switch_id, value } => {
                let changed = client.with_state(|s| s.switch_cache.insert(switch_id, value) != Some(value));
                if changed {
                    client.run_switch(switch_id, value).await;
                }
            }
            RoomRequest::SyncVariable { id: var_id, value } => {
                let changed = client.with_state(|s| s.var_cache.insert(var_id, value) != Some(value));
                if changed {
                    self.record_minigame_scores(client, var_id, value).await;
                    client.run_variable(var_id, value).await;
                }
            }
            RoomRequest::SyncEvent { id: event_id, action } => {
                client
                    .services()
                    .complete_event_action(client.session().uuid(), event_id, action)
                    .await?;
            }
            RoomRequest::SwitchRoom(room_id) => {
                self.switch_room(client, room_id).await?;
            }
        }
        Ok(())
    }

    /// Writes `value` as the new high score of every minigame in the room
    /// tracked through `var_id` whose stored score it beats.
    async fn record_minigame_scores(&self, client: &RoomClient<S>, var_id: i32, value: i32) {
        let room = client.room();
        let beaten: Vec<String> = client.with_state(|s| {
            room.minigames()
                .iter()
                .zip(s.minigame_scores.iter_mut())
                .filter(|(minigame, score)| minigame.var_id == var_id && value > **score)
                .map(|(minigame, score)| {
                    *score = value;
                    minigame.minigame_id.clone()
                })
                .collect()
        });

        let uuid = client.session().uuid();
        for minigame_id in beaten {
            if let Err(e) = client
                .services()
                .write_minigame_score(uuid, &minigame_id, value)
                .await
            {
                error_log(uuid, room.id(), &e);
            }
        }
    }
}

fn check_picture_id(pic_id: i32) -> Result<(), RoomError> {
    if (1..=MAX_PICTURES).contains(&pic_id) {
        Ok(())
    } else {
        Err(RoomError::InvalidValue("picId"))
    }
}

fn move_picture<S: Services>(
    client: &RoomClient<S>,
    pic_id: i32,
    params: PictureParams,
) -> Result<(), RoomError> {
    client.with_state(|s| match s.pictures.get_mut(&pic_id) {
        Some(picture) => {
            picture.params = params;
            Ok(())
        }
        None => Err(RoomError::PictureNotFound(pic_id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_picture_id_bounds() {
        assert!(check_picture_id(1).is_ok());
        assert!(check_picture_id(MAX_PICTURES).is_ok());
        assert!(matches!(check_picture_id(0), Err(RoomError::InvalidValue("picId"))));
        assert!(check_picture_id(MAX_PICTURES + 1).is_err());
    }
}
