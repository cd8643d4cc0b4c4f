/// A remote room member, keyed by the resource part of its MUC occupant
/// Jid. Entries live from the first non-unavailable presence until an
/// `unavailable` one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Participant {
    pub participant_id: String,
    pub nick: String,
    pub audio_muted: bool,
    pub video_muted: bool,
}
