use kafka_protocol::messages::TopicName;
use kafka_protocol::protocol::StrBytes;

pub trait ToStrBytes {
    fn to_str_bytes(&self) -> StrBytes;
}

impl ToStrBytes for str {
    fn to_str_bytes(&self) -> StrBytes {
        StrBytes::from_string(self.to_string())
    }
}

impl ToStrBytes for String {
    fn to_str_bytes(&self) -> StrBytes {
        StrBytes::from_string(self.clone())
    }
}

pub fn topic_name(name: &str) -> TopicName {
    TopicName(name.to_str_bytes())
}

pub fn to_owned(bytes: &StrBytes) -> String {
    let s: &str = bytes;
    s.to_string()
}
