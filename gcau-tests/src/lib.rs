//! A simulated gCAU controller answering on one end of an in-memory duplex stream.
use std::collections::{BTreeMap, HashMap};

use spg_protocol::{
    SYN,
    codec::{backdoor_challenge_reply, close_command, decode_value, encode_value, split_fields},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

#[derive(Clone, Debug)]
pub struct SimulatedController {
    pub slave_number: u32,
    pub challenge: String,
    pub object_schema: u32,
    pub serial_number: String,
    /// Objects rejected with `#ERROR/UO`
    pub unknown_objects: Vec<String>,
    /// Verb echoed in write replies instead of the requested one
    pub reply_verb: Option<String>,
    pub logged_in: bool,
    /// Stored attribute values by object and position
    pub objects: HashMap<String, BTreeMap<u16, String>>,
    /// Every request received, without its terminating CR
    pub requests: Vec<String>,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self {
            slave_number: 3,
            challenge: "123".to_owned(),
            object_schema: 12,
            serial_number: "SN0042".to_owned(),
            unknown_objects: Vec::new(),
            reply_verb: None,
            logged_in: false,
            objects: HashMap::new(),
            requests: Vec::new(),
        }
    }
}

fn frame(body: &str) -> String {
    let mut reply = close_command(body);
    reply.push_str("\n\x06");
    reply
}

fn error(code: &str) -> String {
    frame(&format!("/#ERROR/{}/", code))
}

impl SimulatedController {
    /// The fields of the `REGISTRY` reply, project reference at index 21
    pub fn registry_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = [
            "RCFG", "REGISTRY", "3.12", "2.04", "7", "", "", "en", "4", "Plant\\_1",
        ]
        .iter()
        .map(|f| f.to_string())
        .collect();
        fields[5] = self.object_schema.to_string();
        fields[6] = self.serial_number.clone();
        fields.extend((10..21).map(|i| i.to_string()));
        fields.push("PRJ\\/7".to_owned());
        fields
    }

    /// The reply to `request`, or `None` if the controller stays silent
    pub fn answer(&mut self, request: &str) -> Option<String> {
        self.requests.push(request.to_owned());
        if request == "@" {
            return Some(frame(&format!("/ECHO/{}/", self.slave_number)));
        }
        let slash = request.find('/')?;
        let end = match request.rfind(SYN) {
            Some(syn) if syn > slash && close_command(&request[..syn]).trim_end() == request => syn,
            Some(_) => return Some(error("SE")),
            None => request.len(),
        };
        let fields = split_fields(&request[slash + 1..end]);
        let reply = match fields.as_slice() {
            ["BKDOOR"] => frame(&format!("/BKDOOR/{}/", self.challenge)),
            ["LOGIN", "2", response, ..] => {
                if backdoor_challenge_reply(&self.challenge).as_deref() == Some(*response) {
                    self.logged_in = true;
                    frame("/LOGIN/OK/")
                } else {
                    error("NL")
                }
            }
            ["RCFG", "REGISTRY"] => frame(&format!("/{}/", self.registry_fields().join("/"))),
            [verb @ "WCFG", object, assignments @ ..] => {
                if !self.logged_in {
                    return Some(error("NL"));
                }
                if self.unknown_objects.iter().any(|o| o == object) {
                    return Some(error("UO"));
                }
                let stored = self.objects.entry(object.to_string()).or_default();
                for assignment in assignments {
                    let Some((position, value)) = assignment.split_once(':') else {
                        return Some(error("SE"));
                    };
                    let Ok(position) = position.parse() else {
                        return Some(error("BA"));
                    };
                    stored.insert(position, decode_value(value));
                }
                let last = stored.keys().next_back().copied().unwrap_or(0);
                let mut echoed = vec![
                    self.reply_verb.clone().unwrap_or(verb.to_string()),
                    object.to_string(),
                ];
                echoed.extend((1..=last).map(|p| {
                    stored.get(&p).map(|v| encode_value(v)).unwrap_or_default()
                }));
                frame(&format!("/{}/", echoed.join("/")))
            }
            _ => error("UV"),
        };
        Some(reply)
    }

    /// Answers requests until the other end closes, then returns the final state.
    pub async fn serve(mut self, mut port: DuplexStream) -> SimulatedController {
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while let Ok(1) = port.read(&mut byte).await {
            if byte[0] != b'\r' {
                request.push(byte[0]);
                continue;
            }
            let text = String::from_utf8_lossy(&request).into_owned();
            request.clear();
            if let Some(reply) = self.answer(&text) {
                if port.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
        self
    }
}
