use std::collections::HashMap;

use symphony_core::MessageEnvelope;

/// 同一传输的一批信封
#[derive(Debug, Clone)]
pub struct EnvelopeBatch {
    pub transport_name: String,
    pub envelopes: Vec<MessageEnvelope>,
}

impl EnvelopeBatch {
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// 批量发送聚合器
///
/// 按传输聚合信封，到达上限时产出一个有界批次；
/// 批次绝不混合不同传输。
pub struct BatchSender {
    max_size: usize,
    buffers: HashMap<String, Vec<MessageEnvelope>>,
}

impl BatchSender {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            buffers: HashMap::new(),
        }
    }

    /// 缓冲一个信封；当该传输的缓冲达到上限时返回完整批次
    pub fn push(&mut self, envelope: MessageEnvelope) -> Option<EnvelopeBatch> {
        let transport_name = envelope.transport_name.clone();
        let buffer = self.buffers.entry(transport_name.clone()).or_default();
        buffer.push(envelope);
        if buffer.len() >= self.max_size {
            let envelopes = std::mem::take(buffer);
            return Some(EnvelopeBatch {
                transport_name,
                envelopes,
            });
        }
        None
    }

    /// 清空全部缓冲，产出所有剩余批次
    pub fn flush(&mut self) -> Vec<EnvelopeBatch> {
        self.buffers
            .drain()
            .filter(|(_, envelopes)| !envelopes.is_empty())
            .map(|(transport_name, envelopes)| EnvelopeBatch {
                transport_name,
                envelopes,
            })
            .collect()
    }

    /// 当前缓冲中的信封总数
    pub fn pending(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use symphony_core::MessagePayload;

    fn envelope(transport: &str) -> MessageEnvelope {
        MessageEnvelope::new(
            MessagePayload::custom("send_campaign_step", json!({})),
            transport,
            "messages",
            3,
        )
    }

    #[test]
    fn batch_is_emitted_when_the_bound_is_reached() {
        let mut sender = BatchSender::new(3);
        assert!(sender.push(envelope("supabase")).is_none());
        assert!(sender.push(envelope("supabase")).is_none());
        let batch = sender.push(envelope("supabase")).unwrap();
        assert_eq!(batch.transport_name, "supabase");
        assert_eq!(batch.len(), 3);
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn batches_never_mix_transports() {
        let mut sender = BatchSender::new(2);
        assert!(sender.push(envelope("supabase")).is_none());
        assert!(sender.push(envelope("webhook")).is_none());
        let batch = sender.push(envelope("supabase")).unwrap();
        assert_eq!(batch.transport_name, "supabase");
        assert!(batch.envelopes.iter().all(|e| e.transport_name == "supabase"));
        assert_eq!(sender.pending(), 1);
    }

    #[test]
    fn flush_drains_every_transport_buffer() {
        let mut sender = BatchSender::new(10);
        sender.push(envelope("supabase"));
        sender.push(envelope("supabase"));
        sender.push(envelope("webhook"));
        let mut batches = sender.flush();
        batches.sort_by(|a, b| a.transport_name.cmp(&b.transport_name));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].transport_name, "supabase");
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].transport_name, "webhook");
        assert_eq!(batches[1].len(), 1);
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn zero_bound_is_clamped_to_one() {
        let mut sender = BatchSender::new(0);
        assert!(sender.push(envelope("supabase")).is_some());
    }
}
