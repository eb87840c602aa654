use serde::Deserialize;
use serde_json::Value;

use crate::state::AppState;
use crate::ws::{actor, ConnectionSender};
use crate::{call, chat, friends};

/// Incoming wire frame: {"event": <name>, "data": <payload>}.
#[derive(Debug, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Handle an incoming text frame: decode, dispatch on the event name.
///
/// Malformed frames and unknown events are logged and dropped. The live
/// path carries no error envelope; failures are observable only via the
/// absence of a follow-up event.
pub async fn handle_text_frame(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    session_user: &mut Option<String>,
) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed frame");
            return;
        }
    };

    match frame.event.as_str() {
        "join_room" => {
            let Some(user_id) = frame.data.as_str().filter(|s| !s.is_empty()) else {
                tracing::debug!("join_room without a user id");
                return;
            };
            actor::register_session(state, user_id, tx.clone(), session_user);
        }
        "send_message" => chat::router::handle_send_message(frame.data, state).await,
        "new_messages" => chat::router::handle_new_messages(frame.data, state),
        "status" => chat::presence::handle_status(frame.data, tx, state),
        "typing" => chat::presence::handle_typing(frame.data, state, session_user.as_deref()),
        "is_not_typing" => {
            chat::presence::handle_stop_typing(frame.data, state, session_user.as_deref())
        }
        "user_call" => call::signaling::handle_user_call(frame.data, state).await,
        "request_sender_data" => call::signaling::handle_request_sender_data(frame.data, tx, state),
        "call_accepted" => call::signaling::handle_call_accepted(frame.data, state),
        "call_declined" => {
            call::signaling::handle_call_declined(frame.data, state, session_user.as_deref())
        }
        "call_ended" => call::signaling::handle_call_ended(frame.data, state),
        "get_friends" => friends::events::handle_get_friends(frame.data, tx, state).await,
        "friend_request_sent" => friends::events::handle_request_sent(frame.data, state),
        "friend_request_responded" => friends::events::handle_request_responded(frame.data, state),
        other => {
            tracing::debug!(event = other, "Unhandled event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_decodes_event_and_data() {
        let frame: Frame =
            serde_json::from_str(r#"{"event":"join_room","data":"user-1"}"#).expect("valid frame");
        assert_eq!(frame.event, "join_room");
        assert_eq!(frame.data.as_str(), Some("user-1"));
    }

    #[test]
    fn frame_data_defaults_to_null() {
        let frame: Frame = serde_json::from_str(r#"{"event":"get_friends"}"#).expect("valid frame");
        assert!(frame.data.is_null());
    }
}
