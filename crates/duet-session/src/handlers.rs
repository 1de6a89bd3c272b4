//! Session-socket message handlers.

use duet_protocol::{decode_text, message, Fields, OutMessage, SessionRequest};
use rand::Rng;

use crate::logging::{access_log, error_log};
use crate::manager::SCOPE;
use crate::services::Services;
use crate::{PresenceLocation, SessionClient, SessionError, Sessions};

/// Longest chat message, in characters, after trimming.
pub const MAX_CHAT_LEN: usize = 150;

/// Longest display name, in characters.
pub const MAX_NAME_LEN: usize = 12;

const MSG_ID_LEN: usize = 12;

impl<S: Services> Sessions<S> {
    /// Handles one raw session frame. Failures are logged.
    pub(crate) async fn process(&self, client: &SessionClient, data: &[u8]) {
        let result = match decode_text(data) {
            Ok(text) => self.handle_message(client, text).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error_log(client.uuid(), SCOPE, &e);
        }
    }

    /// Parses and dispatches one session message.
    pub async fn handle_message(&self, client: &SessionClient, text: &str) -> Result<(), SessionError> {
        let request = SessionRequest::parse(Fields::new(text))?;

        match &request {
            SessionRequest::Info => self.handle_info(client),
            SessionRequest::Name(name) => self.handle_name(client, name).await?,
            SessionRequest::PreviousLocation {
                prev_map_id,
                prev_locations,
            } => self.handle_ploc(client, prev_map_id, prev_locations).await?,
            SessionRequest::LocationColors {
                location,
                fg_color,
                bg_color,
            } => self.handle_lcol(client, location, fg_color, bg_color).await?,
            SessionRequest::GlobalSay {
                text,
                enable_location,
            } => self.handle_gsay(client, text, *enable_location)?,
            SessionRequest::PartySay(text) => self.handle_psay(client, text).await?,
            SessionRequest::Locations(locations) => self.handle_l(client, locations).await?,
            SessionRequest::Friends => self.handle_pf(client).await?,
            SessionRequest::Party => {
                if let Err(e) = self.handle_pt(client).await {
                    client.send(message!("pt", "null"));
                    return Err(e);
                }
            }
            SessionRequest::EventPeriod => self.handle_ep(client).await?,
            SessionRequest::Events => self.handle_e(client).await?,
            SessionRequest::ExpeditionPoints => self.handle_eexp(client).await?,
            SessionRequest::ClaimExpedition(event_id) => self.handle_eec(client, event_id).await?,
            SessionRequest::PrivateMode(private) => self.handle_pr(client, *private).await?,
        }

        if request.marks_activity() {
            if let Err(e) = self.services().mark_game_activity(client.uuid()).await {
                error_log(client.uuid(), SCOPE, &e);
            }
        }

        access_log(client.uuid(), SCOPE, text);
        Ok(())
    }

    fn handle_info(&self, client: &SessionClient) {
        client.send(message!(
            "i",
            client.uuid(),
            client.rank(),
            client.is_account(),
            client.badge(),
            client.medals(),
        ));
    }

    async fn handle_name(&self, client: &SessionClient, name: &str) -> Result<(), SessionError> {
        if !client.name().is_empty() {
            return Err(SessionError::NameAlreadySet);
        }
        if !is_valid_name(name) {
            return Err(SessionError::InvalidName(name.to_string()));
        }
        if !client.try_set_name(name) {
            return Err(SessionError::NameAlreadySet);
        }

        self.services().set_name(client.uuid(), name).await?;

        if let Some(presence) = client.presence() {
            presence.announce_name(name);
        }
        Ok(())
    }

    async fn handle_ploc(
        &self,
        client: &SessionClient,
        prev_map_id: &str,
        prev_locations: &str,
    ) -> Result<(), SessionError> {
        if prev_map_id.len() != 4 || !prev_map_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidField("prevMapId"));
        }
        let presence = client.presence().ok_or(SessionError::NotInRoom)?;
        presence
            .report_previous_location(prev_map_id.to_string(), prev_locations.to_string())
            .await;
        Ok(())
    }

    async fn handle_lcol(
        &self,
        client: &SessionClient,
        location: &str,
        fg_color: &str,
        bg_color: &str,
    ) -> Result<(), SessionError> {
        if client.presence().is_none() {
            return Err(SessionError::NotInRoom);
        }
        self.services()
            .save_location_colors(location, fg_color, bg_color)
            .await?;
        Ok(())
    }

    fn handle_gsay(
        &self,
        client: &SessionClient,
        text: &str,
        enable_location: bool,
    ) -> Result<(), SessionError> {
        let text = chat_text(client, text)?;

        let location = if enable_location {
            client.presence().map(|p| p.location())
        } else {
            None
        };
        let (map_id, prev_map_id, prev_locations, x, y) = match location {
            Some(PresenceLocation {
                map_id,
                prev_map_id,
                prev_locations,
                x,
                y,
            }) => (map_id, prev_map_id, prev_locations, x.to_string(), y.to_string()),
            None => Default::default(),
        };

        self.broadcast(&message!(
            "gsay",
            client.uuid(),
            map_id,
            prev_map_id,
            prev_locations,
            x,
            y,
            text,
            message_id(),
        ));
        Ok(())
    }

    async fn handle_psay(&self, client: &SessionClient, text: &str) -> Result<(), SessionError> {
        let text = chat_text(client, text)?;
        let party_id = client.party_id().ok_or(SessionError::NotInParty)?;
        let party = self.services().party(party_id).await?;

        let msg = message!("psay", client.uuid(), text, message_id());
        for member in &party.members {
            if let Some(session) = self.get(&member.uuid) {
                session.send(msg.as_str());
            }
        }
        Ok(())
    }

    async fn handle_l(&self, client: &SessionClient, locations: &[String]) -> Result<(), SessionError> {
        let presence = client.presence().ok_or(SessionError::NotInRoom)?;
        presence.enter_locations(locations.to_vec());

        let exp = self
            .services()
            .complete_locations(client.uuid(), locations)
            .await?;
        if exp > 0 {
            client.send(message!("l", exp));
        }
        Ok(())
    }

    async fn handle_pf(&self, client: &SessionClient) -> Result<(), SessionError> {
        let friends = self.services().friends(client.uuid()).await?;
        client.send(OutMessage::new("pf").json(&friends)?);
        Ok(())
    }

    async fn handle_pt(&self, client: &SessionClient) -> Result<(), SessionError> {
        let party_id = self.services().party_id(client.uuid()).await?;
        client.set_party_id(party_id);
        let party = self
            .services()
            .party(party_id.ok_or(SessionError::NotInParty)?)
            .await?;
        client.send(OutMessage::new("pt").json(&party)?);
        Ok(())
    }

    async fn handle_ep(&self, client: &SessionClient) -> Result<(), SessionError> {
        let period = self.services().current_period().await?;
        client.send(OutMessage::new("ep").json(&period)?);
        Ok(())
    }

    async fn handle_e(&self, client: &SessionClient) -> Result<(), SessionError> {
        let events = self.services().event_locations(client.uuid()).await?;
        client.send(OutMessage::new("e").json(&events)?);
        Ok(())
    }

    async fn handle_eexp(&self, client: &SessionClient) -> Result<(), SessionError> {
        let exp = self.services().exp(client.uuid()).await?;
        client.send(message!("eexp", exp));
        Ok(())
    }

    async fn handle_eec(&self, client: &SessionClient, event_id: &str) -> Result<(), SessionError> {
        let result = self.services().claim(client.uuid(), event_id).await?;
        client.send(message!("eec", result));
        Ok(())
    }

    async fn handle_pr(&self, client: &SessionClient, private: bool) -> Result<(), SessionError> {
        self.services()
            .set_private_mode(client.uuid(), private)
            .await?;
        client.set_private_mode(private);
        Ok(())
    }
}

/// Checks the mute flag and trims chat text to its sendable form.
pub fn chat_text<'a>(client: &SessionClient, text: &'a str) -> Result<&'a str, SessionError> {
    if client.is_muted() {
        return Err(SessionError::Muted);
    }
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 || len > MAX_CHAT_LEN {
        return Err(SessionError::InvalidMessage);
    }
    Ok(text)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Random id clients use to deduplicate chat messages.
fn message_id() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(MSG_ID_LEN)
        .map(char::from)
        .collect()
}
