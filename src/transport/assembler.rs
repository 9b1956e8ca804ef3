// ABOUTME: Reassembles concatenated inbound short messages carried with sar_* TLVs
// ABOUTME: Parts are merged when complete or flushed partially once the merge interval expires

use crate::datatypes::tlv::tags;
use crate::datatypes::{DeliverSm, SarInfo};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartKey {
    source: String,
    reference: u16,
}

#[derive(Debug)]
struct Pending {
    total: u8,
    first_seen: Instant,
    parts: BTreeMap<u8, DeliverSm>,
}

/// Buffers message parts until their siblings arrive
#[derive(Debug)]
pub struct MessageAssembler {
    merge_interval: Duration,
    pending: HashMap<PartKey, Pending>,
}

impl MessageAssembler {
    pub fn new(merge_interval: Duration) -> Self {
        Self {
            merge_interval,
            pending: HashMap::new(),
        }
    }

    /// Number of messages still waiting for parts
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accept one deliver_sm. Returns the message to hand upstream, if one
    /// is now complete. Single-part messages pass straight through.
    pub fn push(&mut self, pdu: DeliverSm, now: Instant) -> Option<DeliverSm> {
        let Some(sar) = pdu.body.sar() else {
            return Some(pdu);
        };
        if sar.total <= 1 {
            return Some(pdu);
        }

        let key = PartKey {
            source: pdu.body.source_addr.clone(),
            reference: sar.reference,
        };
        let entry = self.pending.entry(key.clone()).or_insert_with(|| Pending {
            total: sar.total,
            first_seen: now,
            parts: BTreeMap::new(),
        });
        entry.parts.insert(sar.sequence, pdu);
        debug!(
            "Buffered part {}/{} of message {} from {}",
            sar.sequence, sar.total, sar.reference, key.source
        );

        if entry.parts.len() < entry.total as usize {
            return None;
        }
        let complete = self.pending.remove(&key)?;
        merge(complete.parts)
    }

    /// Flush messages whose parts have waited longer than the merge
    /// interval. Whatever parts arrived are joined in part order.
    pub fn flush_expired(&mut self, now: Instant) -> Vec<DeliverSm> {
        let expired: Vec<PartKey> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.first_seen) >= self.merge_interval)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .filter_map(|pending| {
                debug!(
                    "Flushing {} of {} parts after merge interval",
                    pending.parts.len(),
                    pending.total
                );
                merge(pending.parts)
            })
            .collect()
    }
}

fn merge(parts: BTreeMap<u8, DeliverSm>) -> Option<DeliverSm> {
    let text: String = parts.values().map(|part| part.body.content()).collect();
    let mut merged = parts.into_values().next()?;

    merged.body.tlvs.retain(|tlv| {
        !matches!(
            tlv.tag,
            tags::SAR_MSG_REF_NUM | tags::SAR_TOTAL_SEGMENTS | tags::SAR_SEGMENT_SEQNUM
        )
    });
    merged.body.set_content(&text);
    Some(merged)
}

/// Concatenation info for part `index` (zero based) of `total`
pub fn sar_for(reference: u16, total: usize, index: usize) -> SarInfo {
    SarInfo {
        reference,
        total: u8::try_from(total).unwrap_or(u8::MAX),
        sequence: u8::try_from(index + 1).unwrap_or(u8::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::MessageBody;

    fn part(reference: u16, total: usize, index: usize, text: &str) -> DeliverSm {
        let mut body = MessageBody::new("8080", "+258840000001");
        body.set_content(text);
        body.set_sar(sar_for(reference, total, index));
        DeliverSm::new(index as u32 + 1, body)
    }

    #[test]
    fn single_part_passes_through() {
        let mut assembler = MessageAssembler::new(Duration::from_secs(30));
        let mut body = MessageBody::new("8080", "+258840000001");
        body.set_content("hello");
        let pdu = DeliverSm::new(1, body);

        assert_eq!(assembler.push(pdu.clone(), Instant::now()), Some(pdu));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn parts_merge_in_sequence_order() {
        let mut assembler = MessageAssembler::new(Duration::from_secs(30));
        let now = Instant::now();

        assert!(assembler.push(part(7, 3, 2, "three"), now).is_none());
        assert!(assembler.push(part(7, 3, 0, "one "), now).is_none());
        let merged = assembler.push(part(7, 3, 1, "two "), now).unwrap();

        assert_eq!(merged.body.content(), "one two three");
        assert_eq!(merged.body.sar(), None);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn expired_parts_flush_partially() {
        let mut assembler = MessageAssembler::new(Duration::from_secs(30));
        let start = Instant::now();

        assembler.push(part(9, 3, 2, "c"), start);
        assembler.push(part(9, 3, 0, "a"), start);
        assert!(assembler.flush_expired(start + Duration::from_secs(5)).is_empty());

        let flushed = assembler.flush_expired(start + Duration::from_secs(31));
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].body.content(), "ac");
        assert_eq!(assembler.pending(), 0);
    }
}
