use std::collections::HashMap;

use crate::modules::config::MessageConfig;
use crate::modules::geometry::Position;
use crate::modules::world::AgentId;

const TYPE_SHIFT: u32 = 28;
const Y_SHIFT: u32 = 16;
const X_SHIFT: u32 = 4;
const COORD_MASK: u32 = 0xFFF;
const LOW_MASK: u32 = 0xF;

/// Enemy base health is reported in buckets of this size.
pub const BASE_HEALTH_BUCKET: i32 = 35;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    EnemyBaseSighting,
    ThreatWarning,
    HazardBait,
    EnemySpotted,
}

impl MessageKind {
    const fn code(self) -> u32 {
        match self {
            MessageKind::EnemyBaseSighting => 1,
            MessageKind::ThreatWarning => 2,
            MessageKind::HazardBait => 3,
            MessageKind::EnemySpotted => 4,
        }
    }
}

/// Fixed-width payload packed into a single 32-bit word:
/// `type << 28 | y << 16 | x << 4 | low4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    EnemyBaseSighting { position: Position, health_bucket: u8 },
    ThreatWarning { position: Position, count: u8 },
    HazardBait { position: Position },
    /// Early sighting used as a rush warning.
    EnemySpotted { position: Position, count: u8 },
}

impl Message {
    pub fn enemy_base(position: Position, health: i32) -> Self {
        Message::EnemyBaseSighting {
            position,
            health_bucket: (health.max(0) / BASE_HEALTH_BUCKET).min(LOW_MASK as i32) as u8,
        }
    }

    pub fn threat(position: Position, count: usize) -> Self {
        Message::ThreatWarning {
            position,
            count: count.min(LOW_MASK as usize) as u8,
        }
    }

    pub fn spotted(position: Position, count: usize) -> Self {
        Message::EnemySpotted {
            position,
            count: count.min(LOW_MASK as usize) as u8,
        }
    }

    pub const fn kind(&self) -> MessageKind {
        match self {
            Message::EnemyBaseSighting { .. } => MessageKind::EnemyBaseSighting,
            Message::ThreatWarning { .. } => MessageKind::ThreatWarning,
            Message::HazardBait { .. } => MessageKind::HazardBait,
            Message::EnemySpotted { .. } => MessageKind::EnemySpotted,
        }
    }

    pub const fn position(&self) -> Position {
        match self {
            Message::EnemyBaseSighting { position, .. }
            | Message::ThreatWarning { position, .. }
            | Message::HazardBait { position }
            | Message::EnemySpotted { position, .. } => *position,
        }
    }

    pub fn encode(&self) -> u32 {
        let low = match self {
            Message::EnemyBaseSighting { health_bucket, .. } => *health_bucket as u32,
            Message::ThreatWarning { count, .. } | Message::EnemySpotted { count, .. } => {
                *count as u32
            }
            Message::HazardBait { .. } => 0,
        };
        let pos = self.position();
        (self.kind().code() << TYPE_SHIFT)
            | ((pos.y.max(0) as u32 & COORD_MASK) << Y_SHIFT)
            | ((pos.x.max(0) as u32 & COORD_MASK) << X_SHIFT)
            | (low & LOW_MASK)
    }

    /// Unknown type codes decode to `None`.
    pub fn decode(word: u32) -> Option<Message> {
        let position = Position::new(
            ((word >> X_SHIFT) & COORD_MASK) as i32,
            ((word >> Y_SHIFT) & COORD_MASK) as i32,
        );
        let low = (word & LOW_MASK) as u8;
        match word >> TYPE_SHIFT {
            1 => Some(Message::EnemyBaseSighting {
                position,
                health_bucket: low,
            }),
            2 => Some(Message::ThreatWarning {
                position,
                count: low,
            }),
            3 => Some(Message::HazardBait { position }),
            4 => Some(Message::EnemySpotted {
                position,
                count: low,
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Envelope {
    seq: u64,
    tick: u64,
    sender: AgentId,
    word: u32,
}

/// Rate-limited broadcast channel for one team.
#[derive(Clone, Debug, Default)]
pub struct MessageQueue {
    entries: Vec<Envelope>,
    next_seq: u64,
    retention: u64,
    last_send: HashMap<AgentId, u64>,
    watermarks: HashMap<AgentId, u64>,
}

impl MessageQueue {
    pub fn new(retention: u64) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 1,
            retention,
            last_send: HashMap::new(),
            watermarks: HashMap::new(),
        }
    }

    /// Drops the message if `sender` already sent one this tick.
    pub fn send(&mut self, tick: u64, sender: AgentId, message: Message) -> bool {
        if self.last_send.get(&sender) == Some(&tick) {
            return false;
        }
        self.last_send.insert(sender, tick);
        self.entries.push(Envelope {
            seq: self.next_seq,
            tick,
            sender,
            word: message.encode(),
        });
        self.next_seq += 1;
        true
    }

    /// Up to `limit` of the newest messages `reader` has not seen yet, newest
    /// first. Anything older than the newest returned message is hidden from
    /// this reader afterwards.
    pub fn drain(&mut self, tick: u64, reader: AgentId, limit: usize) -> Vec<Message> {
        let watermark = self.watermarks.get(&reader).copied().unwrap_or(0);
        let retention = self.retention;
        let visible: Vec<Envelope> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.seq > watermark && e.sender != reader && e.tick + retention >= tick)
            .take(limit)
            .copied()
            .collect();

        if let Some(newest) = visible.first() {
            self.watermarks.insert(reader, newest.seq);
        }
        visible.iter().filter_map(|e| Message::decode(e.word)).collect()
    }

    /// Forgets messages past their visibility window.
    pub fn expire(&mut self, tick: u64) {
        let retention = self.retention;
        self.entries.retain(|e| e.tick + retention >= tick);
    }

    pub fn forget_agent(&mut self, agent: AgentId) {
        self.last_send.remove(&agent);
        self.watermarks.remove(&agent);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-sender pacing on top of the queue's one-per-tick limit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SendThrottle {
    last_any: Option<u64>,
    last_threat: Option<u64>,
    last_bait: Option<u64>,
}

impl SendThrottle {
    pub fn allows(&self, kind: MessageKind, tick: u64, config: &MessageConfig) -> bool {
        let elapsed = |last: Option<u64>, gap: u64| last.is_none_or(|t| tick >= t + gap);
        if !elapsed(self.last_any, config.min_send_gap) {
            return false;
        }
        match kind {
            MessageKind::ThreatWarning => elapsed(self.last_threat, config.threat_send_gap),
            MessageKind::HazardBait => elapsed(self.last_bait, config.bait_send_gap),
            MessageKind::EnemyBaseSighting | MessageKind::EnemySpotted => true,
        }
    }

    pub fn record(&mut self, kind: MessageKind, tick: u64) {
        self.last_any = Some(tick);
        match kind {
            MessageKind::ThreatWarning => self.last_threat = Some(tick),
            MessageKind::HazardBait => self.last_bait = Some(tick),
            MessageKind::EnemyBaseSighting | MessageKind::EnemySpotted => {}
        }
    }
}
