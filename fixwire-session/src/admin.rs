/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Builders for session-level (admin) messages.
//!
//! Only message-specific fields are set here; the session fills the standard
//! header when it sends.

use crate::application::RejectReason;
use fixwire_core::message::{Message, MsgType};
use fixwire_core::tags;
use std::time::Duration;

/// Logon (35=A).
#[must_use]
pub fn logon(heartbeat_interval: Duration, reset_seq_num: bool, default_appl_ver_id: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Logon);
    let body = msg.body_mut();
    body.set(tags::ENCRYPT_METHOD, "0");
    body.set_u64(tags::HEART_BT_INT, heartbeat_interval.as_secs());
    if reset_seq_num {
        body.set_bool(tags::RESET_SEQ_NUM_FLAG, true);
    }
    if let Some(id) = default_appl_ver_id {
        body.set(tags::DEFAULT_APPL_VER_ID, id);
    }
    msg
}

/// Heartbeat (35=0), echoing a TestReqID when answering a TestRequest.
#[must_use]
pub fn heartbeat(test_req_id: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Heartbeat);
    if let Some(id) = test_req_id {
        msg.body_mut().set(tags::TEST_REQ_ID, id);
    }
    msg
}

/// TestRequest (35=1).
#[must_use]
pub fn test_request(test_req_id: &str) -> Message {
    let mut msg = Message::new(MsgType::TestRequest);
    msg.body_mut().set(tags::TEST_REQ_ID, test_req_id);
    msg
}

/// ResendRequest (35=2) for `[begin, end]`; `end == 0` is open-ended.
#[must_use]
pub fn resend_request(begin: u64, end: u64) -> Message {
    let mut msg = Message::new(MsgType::ResendRequest);
    msg.body_mut().set_u64(tags::BEGIN_SEQ_NO, begin);
    msg.body_mut().set_u64(tags::END_SEQ_NO, end);
    msg
}

/// SequenceReset (35=4), in GapFill mode or Reset mode.
#[must_use]
pub fn sequence_reset(new_seq_no: u64, gap_fill: bool) -> Message {
    let mut msg = Message::new(MsgType::SequenceReset);
    if gap_fill {
        msg.body_mut().set_bool(tags::GAP_FILL_FLAG, true);
    }
    msg.body_mut().set_u64(tags::NEW_SEQ_NO, new_seq_no);
    msg
}

/// Logout (35=5).
#[must_use]
pub fn logout(text: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Logout);
    if let Some(text) = text {
        msg.body_mut().set(tags::TEXT, text);
    }
    msg
}

/// Session-level Reject (35=3) of message `ref_seq_num`.
#[must_use]
pub fn reject(ref_seq_num: u64, ref_msg_type: Option<&MsgType>, reason: &RejectReason) -> Message {
    let mut msg = Message::new(MsgType::Reject);
    let body = msg.body_mut();
    body.set_u64(tags::REF_SEQ_NUM, ref_seq_num);
    if let Some(tag) = reason.ref_tag {
        body.set_u64(tags::REF_TAG_ID, u64::from(tag));
    }
    if let Some(msg_type) = ref_msg_type {
        body.set(tags::REF_MSG_TYPE, msg_type.as_str());
    }
    body.set_u64(tags::SESSION_REJECT_REASON, u64::from(reason.code));
    if !reason.text.is_empty() {
        body.set(tags::TEXT, reason.text.as_str());
    }
    msg
}

/// BusinessMessageReject (35=j) of application message `ref_seq_num`.
#[must_use]
pub fn business_reject(ref_seq_num: u64, ref_msg_type: &MsgType, reason: &RejectReason) -> Message {
    let mut msg = Message::new(MsgType::BusinessMessageReject);
    let body = msg.body_mut();
    body.set_u64(tags::REF_SEQ_NUM, ref_seq_num);
    body.set(tags::REF_MSG_TYPE, ref_msg_type.as_str());
    body.set_u64(tags::BUSINESS_REJECT_REASON, u64::from(reason.code));
    if !reason.text.is_empty() {
        body.set(tags::TEXT, reason.text.as_str());
    }
    msg
}
