//! The process communicator (component E): group-oriented read/write
//! access built on top of a [`NetworkLink`](crate::link::NetworkLink).
//!
//! `readFromGroup` sends a `GroupValueRead` and blocks the calling thread
//! until a matching `GroupValueResponse` arrives or the configured
//! timeout elapses. Because several readers can be outstanding for the
//! same group at once, pending reads are tracked in a small registry
//! keyed by group address rather than by a single request/response pair.

pub mod apdu;

use crate::address::{Address, GroupAddress, IndividualAddress};
use crate::cemi::{Frame, LData, LDataMessageCode};
use crate::config::ProcessCommunicatorConfig;
use crate::dpt::Translator;
use crate::error::{KnxError, Result};
use crate::link::{LinkListener, NetworkLink};
use crate::secure::{use_go_diagnostics, SecureApplicationLayer};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

struct Outstanding {
    reader_count: u32,
    response: Option<Vec<u8>>,
}

struct Registry {
    outstanding: Mutex<HashMap<GroupAddress, Outstanding>>,
    cond: Condvar,
}

/// Length window (ASDU payload bytes *beyond* the 2-byte group-service
/// header) a `readFromGroup` caller expects back. The window is checked
/// against the raw APDU (TPDU) length as `[min+2, max+2]`, before the
/// ASDU is extracted — a length-optimized 2-byte frame and a normal
/// 3-byte frame both decode to a 1-byte ASDU, but only one of them is
/// the valid wire form for a given datapoint, so the check has to run on
/// the frame as received, not on the value already pulled out of it.
#[derive(Debug, Clone, Copy)]
pub struct LengthWindow {
    pub min: usize,
    pub max: usize,
}

impl LengthWindow {
    pub const fn exact(len: usize) -> Self {
        LengthWindow { min: len, max: len }
    }
}

/// Sends group reads/writes over a [`NetworkLink`] and dispatches
/// incoming responses back to whichever caller is waiting for them.
pub struct ProcessCommunicator {
    link: Arc<dyn NetworkLink>,
    config: ProcessCommunicatorConfig,
    registry: Arc<Registry>,
    detached: Mutex<bool>,
    listener: Arc<dyn LinkListener>,
    secure: Mutex<Option<Arc<dyn SecureApplicationLayer>>>,
    go_diagnostics_override: Mutex<Option<bool>>,
}

/// Decrements a group's outstanding-reader count on drop, removing the
/// registry entry entirely once it reaches zero.
struct ReaderGuard {
    registry: Arc<Registry>,
    group: GroupAddress,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        let mut map = self.registry.outstanding.lock().unwrap();
        if let std::collections::hash_map::Entry::Occupied(mut e) = map.entry(self.group) {
            e.get_mut().reader_count -= 1;
            if e.get().reader_count == 0 {
                e.remove();
            }
        }
    }
}

impl ProcessCommunicator {
    pub fn new(link: Arc<dyn NetworkLink>, config: ProcessCommunicatorConfig) -> Arc<Self> {
        let registry = Arc::new(Registry {
            outstanding: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
        });
        let listener: Arc<dyn LinkListener> = Arc::new(Dispatcher { registry: Arc::clone(&registry) });
        link.add_link_listener(Arc::clone(&listener));
        Arc::new(ProcessCommunicator {
            link,
            config,
            registry,
            detached: Mutex::new(false),
            listener,
            secure: Mutex::new(None),
            go_diagnostics_override: Mutex::new(None),
        })
    }

    /// Attach the secure-application-layer collaborator. Group writes are
    /// then routed through it per §6's secure-wrapping decision.
    pub fn attach_secure_application_layer(&self, secure: Arc<dyn SecureApplicationLayer>) {
        *self.secure.lock().unwrap() = Some(secure);
    }

    /// Override the group-object-diagnostics decision; `None` lets it
    /// follow whether the destination carries a group key.
    pub fn set_group_object_diagnostics_override(&self, enabled: Option<bool>) {
        *self.go_diagnostics_override.lock().unwrap() = enabled;
    }

    fn device_address(&self) -> IndividualAddress {
        self.link.device_address()
    }

    fn check_open(&self) -> Result<()> {
        if *self.detached.lock().unwrap() || !self.link.is_open() {
            return Err(KnxError::LinkClosed);
        }
        Ok(())
    }

    pub fn write_to_group(&self, group: GroupAddress, asdu: &[u8]) -> Result<()> {
        self.check_open()?;

        let secure = self.secure.lock().unwrap().clone();
        if let Some(secure) = secure {
            let keys = secure.group_keys();
            let has_key = keys.key_for(group).is_some();
            let diagnostics_override = *self.go_diagnostics_override.lock().unwrap();
            if has_key && use_go_diagnostics(group, keys.as_ref(), diagnostics_override) {
                return secure.write_group_object_diagnostics(group, asdu);
            }
            if let Some(secured) = secure.secure_group_object(self.device_address(), group, asdu)? {
                return self.send_group_write(group, &secured);
            }
        }
        self.send_group_write(group, asdu)
    }

    fn send_group_write(&self, group: GroupAddress, asdu: &[u8]) -> Result<()> {
        let tpdu = apdu::encode(apdu::GROUP_WRITE, asdu);
        let frame = LData::new(
            LDataMessageCode::Req,
            self.device_address(),
            Address::Group(group),
            self.config.priority,
            6,
            tpdu,
        )?;
        self.link.send_request_wait(Frame::LData(frame))
    }

    /// Send a `GroupValueRead` for `group` and block for a matching
    /// response whose ASDU length falls in `window`.
    pub fn read_from_group(&self, group: GroupAddress, window: LengthWindow) -> Result<Vec<u8>> {
        self.check_open()?;

        {
            let mut map = self.registry.outstanding.lock().unwrap();
            map.entry(group)
                .or_insert_with(|| Outstanding { reader_count: 0, response: None })
                .reader_count += 1;
        }
        let _guard = ReaderGuard { registry: Arc::clone(&self.registry), group };

        let tpdu = apdu::encode(apdu::GROUP_READ, &[]);
        let frame = LData::new(
            LDataMessageCode::Req,
            self.device_address(),
            Address::Group(group),
            self.config.priority,
            6,
            tpdu,
        )?;
        self.link.send_request_wait(Frame::LData(frame))?;

        let map = self.registry.outstanding.lock().unwrap();
        let (mut map, _timeout) = self
            .registry
            .cond
            .wait_timeout_while(map, self.config.response_timeout, |m| {
                m.get(&group).map_or(true, |o| o.response.is_none())
            })
            .unwrap();

        let tpdu = match map.get_mut(&group).and_then(|o| o.response.take()) {
            Some(tpdu) => tpdu,
            None => return Err(KnxError::Timeout),
        };
        drop(map);

        let apdu_min = window.min + 2;
        let apdu_max = window.max + 2;
        if tpdu.len() < apdu_min || tpdu.len() > apdu_max {
            return Err(KnxError::InvalidResponse {
                actual: tpdu.len(),
                min: apdu_min,
                max: apdu_max,
            });
        }
        let (_, asdu) = apdu::decode(&tpdu)?;
        Ok(asdu)
    }

    /// Booleans are always the length-optimized form: no payload beyond
    /// the 2-byte header.
    pub fn read_bool(&self, group: GroupAddress) -> Result<bool> {
        let asdu = self.read_from_group(group, LengthWindow::exact(0))?;
        Ok(asdu[0] & 0x01 != 0)
    }

    pub fn read_unsigned(&self, group: GroupAddress) -> Result<u8> {
        let asdu = self.read_from_group(group, LengthWindow::exact(1))?;
        Ok(asdu[0])
    }

    /// DPT3 control: bit 3 is direction, bits 2..0 are the step code.
    /// Also length-optimized, like bool.
    pub fn read_control(&self, group: GroupAddress) -> Result<(bool, u8)> {
        let asdu = self.read_from_group(group, LengthWindow::exact(0))?;
        Ok((asdu[0] & 0x08 != 0, asdu[0] & 0x07))
    }

    /// DPT9 16-bit floating point.
    pub fn read_float(&self, group: GroupAddress) -> Result<f64> {
        let asdu = self.read_from_group(group, LengthWindow { min: 2, max: 4 })?;
        Ok(decode_dpt9(asdu[0], asdu[1]))
    }

    /// DPT16 14-byte fixed-length ISO-8859-1 string.
    pub fn read_string(&self, group: GroupAddress) -> Result<String> {
        let asdu = self.read_from_group(group, LengthWindow { min: 0, max: 14 })?;
        let end = asdu.iter().position(|&b| b == 0).unwrap_or(asdu.len());
        Ok(asdu[..end].iter().map(|&b| b as char).collect())
    }

    pub fn read(&self, group: GroupAddress, dp: &mut dyn Translator) -> Result<()> {
        let asdu = self.read_from_group(group, LengthWindow { min: 0, max: 8 })?;
        dp.set_data(&asdu)
    }

    pub fn read_numeric(&self, group: GroupAddress, dp: &mut dyn Translator) -> Result<f64> {
        self.read(group, dp)?;
        dp.numeric_value()
    }

    /// Idempotent: the first call removes the link listener, closes the
    /// secure layer, wakes any blocked readers, and hands back the link;
    /// later calls return `None`.
    pub fn detach(&self) -> Option<Arc<dyn NetworkLink>> {
        let mut detached = self.detached.lock().unwrap();
        if *detached {
            return None;
        }
        *detached = true;
        self.link.remove_link_listener(&self.listener);
        if let Some(secure) = self.secure.lock().unwrap().take() {
            secure.close();
        }
        self.registry.cond.notify_all();
        Some(Arc::clone(&self.link))
    }
}

fn decode_dpt9(hi: u8, lo: u8) -> f64 {
    let sign = hi & 0x80 != 0;
    let exponent = (hi >> 3) & 0x0F;
    let mantissa = (((hi & 0x07) as i16) << 8 | lo as i16) as i16;
    let mantissa = if sign { mantissa - 2048 } else { mantissa };
    0.01 * (mantissa as f64) * (1u32 << exponent) as f64
}

struct Dispatcher {
    registry: Arc<Registry>,
}

impl LinkListener for Dispatcher {
    fn frame_received(&self, frame: &Frame) {
        let (tpdu, group) = match frame {
            Frame::LData(f) => match f.destination() {
                Address::Group(g) => (&f.tpdu, g),
                _ => return,
            },
            Frame::LDataExtended(f) => match f.destination() {
                Address::Group(g) => (&f.tpdu, g),
                _ => return,
            },
            _ => return,
        };
        let (apci, _) = match apdu::decode(tpdu) {
            Ok(v) => v,
            Err(_) => return,
        };
        if apci != apdu::GROUP_RESPONSE {
            return;
        }
        let mut map = self.registry.outstanding.lock().unwrap();
        if let Some(o) = map.get_mut(&group) {
            o.response = Some(tpdu.clone());
            self.registry.cond.notify_all();
        }
        // No outstanding reader for this group: the response is simply not
        // consumed here: it is still delivered to the link's other
        // listeners, so it is never silently dropped.
    }

    fn link_closed(&self, _reason: &str) {
        self.registry.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Priority;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct LoopbackLink {
        device: IndividualAddress,
        listeners: Mutex<Vec<Arc<dyn LinkListener>>>,
        open: AtomicBool,
    }

    impl LoopbackLink {
        fn new() -> Arc<Self> {
            Arc::new(LoopbackLink {
                device: IndividualAddress::new(0x1101),
                listeners: Mutex::new(Vec::new()),
                open: AtomicBool::new(true),
            })
        }

        fn deliver(&self, frame: Frame) {
            for l in self.listeners.lock().unwrap().iter() {
                l.frame_received(&frame);
            }
        }
    }

    impl NetworkLink for LoopbackLink {
        fn send_request_wait(&self, frame: Frame) -> Result<()> {
            if let Frame::LData(f) = &frame {
                if let Ok((apci, _)) = apdu::decode(&f.tpdu) {
                    if apci == apdu::GROUP_READ {
                        let response_tpdu = apdu::encode(apdu::GROUP_RESPONSE, &[1]);
                        let response = LData::new(
                            LDataMessageCode::Ind,
                            IndividualAddress::new(0x1102),
                            f.destination(),
                            Priority::Low,
                            6,
                            response_tpdu,
                        )
                        .unwrap();
                        self.deliver(Frame::LData(response));
                    }
                }
            }
            Ok(())
        }

        fn add_link_listener(&self, listener: Arc<dyn LinkListener>) {
            self.listeners.lock().unwrap().push(listener);
        }

        fn remove_link_listener(&self, listener: &Arc<dyn LinkListener>) {
            self.listeners.lock().unwrap().retain(|l| !Arc::ptr_eq(l, listener));
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        fn device_address(&self) -> IndividualAddress {
            self.device
        }

        fn close(&self) {
            self.open.store(false, Ordering::Release);
        }
    }

    #[test]
    fn read_bool_round_trips_through_loopback() {
        let link = LoopbackLink::new();
        let pc = ProcessCommunicator::new(link, ProcessCommunicatorConfig::default());
        let group = GroupAddress::from_levels3(1, 1, 1).unwrap();
        assert!(pc.read_bool(group).unwrap());
    }

    #[test]
    fn invalid_response_length_is_rejected_then_retry_succeeds() {
        // A link that first answers with a too-long ASDU, then a valid one.
        struct Flaky {
            device: IndividualAddress,
            listeners: Mutex<Vec<Arc<dyn LinkListener>>>,
            calls: Mutex<u32>,
        }
        impl NetworkLink for Flaky {
            fn send_request_wait(&self, frame: Frame) -> Result<()> {
                if let Frame::LData(f) = &frame {
                    let mut calls = self.calls.lock().unwrap();
                    *calls += 1;
                    let asdu: Vec<u8> = if *calls == 1 { vec![1, 2, 3] } else { vec![1] };
                    let response_tpdu = apdu::encode(apdu::GROUP_RESPONSE, &asdu);
                    let response = LData::new(
                        LDataMessageCode::Ind,
                        IndividualAddress::new(0x1102),
                        f.destination(),
                        Priority::Low,
                        6,
                        response_tpdu,
                    )
                    .unwrap();
                    for l in self.listeners.lock().unwrap().iter() {
                        l.frame_received(&Frame::LData(response.clone()));
                    }
                }
                Ok(())
            }
            fn add_link_listener(&self, listener: Arc<dyn LinkListener>) {
                self.listeners.lock().unwrap().push(listener);
            }
            fn remove_link_listener(&self, listener: &Arc<dyn LinkListener>) {
                self.listeners.lock().unwrap().retain(|l| !Arc::ptr_eq(l, listener));
            }
            fn is_open(&self) -> bool {
                true
            }
            fn device_address(&self) -> IndividualAddress {
                self.device
            }
            fn close(&self) {}
        }

        let link = Arc::new(Flaky { device: IndividualAddress::new(0x1101), listeners: Mutex::new(Vec::new()), calls: Mutex::new(0) });
        let pc = ProcessCommunicator::new(link, ProcessCommunicatorConfig::default());
        let group = GroupAddress::from_levels3(1, 1, 1).unwrap();

        let first = pc.read_bool(group);
        assert!(matches!(first, Err(KnxError::InvalidResponse { .. })));
        let second = pc.read_bool(group).unwrap();
        assert!(second);
    }

    #[test]
    fn detach_removes_listener_and_is_idempotent() {
        let link = LoopbackLink::new();
        let pc = ProcessCommunicator::new(Arc::clone(&link) as Arc<dyn NetworkLink>, ProcessCommunicatorConfig::default());
        assert_eq!(link.listeners.lock().unwrap().len(), 1);

        assert!(pc.detach().is_some());
        assert!(link.listeners.lock().unwrap().is_empty());
        assert!(pc.detach().is_none());

        let group = GroupAddress::from_levels3(1, 1, 1).unwrap();
        assert!(matches!(pc.read_bool(group), Err(KnxError::LinkClosed)));
    }

    struct MockKeyStore {
        group: GroupAddress,
    }
    impl crate::secure::GroupKeyStore for MockKeyStore {
        fn key_for(&self, group: GroupAddress) -> Option<[u8; 16]> {
            if group == self.group { Some([0u8; 16]) } else { None }
        }
    }

    struct MockSecure {
        group: GroupAddress,
        secured_calls: Mutex<u32>,
        diagnostics_calls: Mutex<u32>,
    }
    impl crate::secure::SecureApplicationLayer for MockSecure {
        fn secure_group_object(&self, _src: IndividualAddress, dst: GroupAddress, plain_asdu: &[u8]) -> Result<Option<Vec<u8>>> {
            *self.secured_calls.lock().unwrap() += 1;
            if dst == self.group {
                let mut secured = plain_asdu.to_vec();
                secured.push(0xFF);
                Ok(Some(secured))
            } else {
                Ok(None)
            }
        }
        fn write_group_object_diagnostics(&self, _dst: GroupAddress, _data: &[u8]) -> Result<()> {
            *self.diagnostics_calls.lock().unwrap() += 1;
            Ok(())
        }
        fn group_keys(&self) -> Arc<dyn crate::secure::GroupKeyStore> {
            Arc::new(MockKeyStore { group: self.group })
        }
        fn close(&self) {}
    }

    struct RecordingLink {
        device: IndividualAddress,
        listeners: Mutex<Vec<Arc<dyn LinkListener>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }
    impl NetworkLink for RecordingLink {
        fn send_request_wait(&self, frame: Frame) -> Result<()> {
            if let Frame::LData(f) = &frame {
                self.sent.lock().unwrap().push(f.tpdu.clone());
            }
            Ok(())
        }
        fn add_link_listener(&self, listener: Arc<dyn LinkListener>) {
            self.listeners.lock().unwrap().push(listener);
        }
        fn remove_link_listener(&self, listener: &Arc<dyn LinkListener>) {
            self.listeners.lock().unwrap().retain(|l| !Arc::ptr_eq(l, listener));
        }
        fn is_open(&self) -> bool {
            true
        }
        fn device_address(&self) -> IndividualAddress {
            self.device
        }
        fn close(&self) {}
    }

    #[test]
    fn write_to_group_secures_when_a_key_exists_and_sends_plain_otherwise() {
        let secured_group = GroupAddress::from_levels3(1, 1, 1).unwrap();
        let plain_group = GroupAddress::from_levels3(1, 1, 2).unwrap();
        let link = Arc::new(RecordingLink {
            device: IndividualAddress::new(0x1101),
            listeners: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });
        let pc = ProcessCommunicator::new(Arc::clone(&link) as Arc<dyn NetworkLink>, ProcessCommunicatorConfig::default());
        let secure = Arc::new(MockSecure {
            group: secured_group,
            secured_calls: Mutex::new(0),
            diagnostics_calls: Mutex::new(0),
        });
        pc.attach_secure_application_layer(secure.clone());

        pc.write_to_group(secured_group, &[0x01]).unwrap();
        pc.write_to_group(plain_group, &[0x02]).unwrap();

        assert_eq!(*secure.secured_calls.lock().unwrap(), 2);
        assert_eq!(*secure.diagnostics_calls.lock().unwrap(), 0);
        let sent = link.sent.lock().unwrap();
        let (_, secured_asdu) = apdu::decode(&sent[0]).unwrap();
        assert_eq!(secured_asdu, vec![0x01, 0xFF]);
        let (_, plain_asdu) = apdu::decode(&sent[1]).unwrap();
        assert_eq!(plain_asdu, vec![0x02]);
    }

    #[test]
    fn write_to_group_uses_diagnostics_when_enabled_and_key_exists() {
        let group = GroupAddress::from_levels3(1, 1, 1).unwrap();
        let link = Arc::new(RecordingLink {
            device: IndividualAddress::new(0x1101),
            listeners: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });
        let pc = ProcessCommunicator::new(Arc::clone(&link) as Arc<dyn NetworkLink>, ProcessCommunicatorConfig::default());
        let secure = Arc::new(MockSecure {
            group,
            secured_calls: Mutex::new(0),
            diagnostics_calls: Mutex::new(0),
        });
        pc.attach_secure_application_layer(secure.clone());
        pc.set_group_object_diagnostics_override(Some(true));

        pc.write_to_group(group, &[0x01]).unwrap();

        assert_eq!(*secure.diagnostics_calls.lock().unwrap(), 1);
        assert_eq!(*secure.secured_calls.lock().unwrap(), 0);
        assert!(link.sent.lock().unwrap().is_empty());
    }
}
