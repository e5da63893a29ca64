use anyhow::{Context, Result};
use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::*;
use std::os::raw::c_void;
use std::ptr;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use super::device::{DeviceSnapshot, Direction};
use crate::system::AudioSystemInterface;

type Callbacks = Mutex<Vec<Box<dyn Fn() + Send + Sync>>>;

/// CoreAudio HAL adapter. Devices are addressed by their persistent UID;
/// the numeric `AudioDeviceID` is looked up per call because it changes
/// across reconnects.
pub struct CoreAudioSystem {
    callbacks: Arc<Callbacks>,
    listening: Mutex<bool>,
}

impl CoreAudioSystem {
    pub fn new() -> Result<Self> {
        info!("Creating CoreAudio system adapter");

        // Deliver property notifications on a HAL-owned thread instead of
        // requiring a CFRunLoop on ours
        let run_loop: *mut c_void = ptr::null_mut();
        let address = property_address(kAudioHardwarePropertyRunLoop, kAudioObjectPropertyScopeGlobal);
        let status = unsafe {
            AudioObjectSetPropertyData(
                kAudioObjectSystemObject,
                &address,
                0,
                ptr::null(),
                std::mem::size_of::<*mut c_void>() as u32,
                &run_loop as *const _ as *const c_void,
            )
        };
        check(status, "set HAL notification run loop")?;

        Ok(Self {
            callbacks: Arc::new(Mutex::new(Vec::new())),
            listening: Mutex::new(false),
        })
    }

    fn find_device_id(&self, uid: &str) -> Result<Option<AudioDeviceID>> {
        for device_id in device_ids()? {
            if read_cf_string(device_id, kAudioDevicePropertyDeviceUID).ok().as_deref() == Some(uid) {
                return Ok(Some(device_id));
            }
        }
        Ok(None)
    }

    fn listener_data(&self) -> *mut c_void {
        Arc::as_ptr(&self.callbacks) as *mut c_void
    }
}

impl AudioSystemInterface for CoreAudioSystem {
    fn enumerate_devices(&self) -> Result<Vec<DeviceSnapshot>> {
        let mut snapshots = Vec::new();

        for device_id in device_ids()? {
            let uid = match read_cf_string(device_id, kAudioDevicePropertyDeviceUID) {
                Ok(uid) => uid,
                Err(e) => {
                    debug!("Skipping device {} without UID: {:#}", device_id, e);
                    continue;
                }
            };
            let name = read_cf_string(device_id, kAudioDevicePropertyDeviceNameCFString)
                .unwrap_or_else(|_| "Unknown Device".to_string());

            let is_input = has_streams(device_id, Direction::Input);
            let is_output = has_streams(device_id, Direction::Output);
            if !is_input && !is_output {
                continue;
            }

            snapshots.push(DeviceSnapshot::new(uid, name, is_input, is_output));
        }

        debug!("Enumerated {} CoreAudio devices", snapshots.len());
        Ok(snapshots)
    }

    fn get_default_device(&self, direction: Direction) -> Result<Option<String>> {
        let address = property_address(default_selector(direction), kAudioObjectPropertyScopeGlobal);
        let mut device_id: AudioDeviceID = kAudioObjectUnknown;
        let mut size = std::mem::size_of::<AudioDeviceID>() as u32;

        let status = unsafe {
            AudioObjectGetPropertyData(
                kAudioObjectSystemObject,
                &address,
                0,
                ptr::null(),
                &mut size,
                &mut device_id as *mut _ as *mut c_void,
            )
        };
        check(status, "get default device")?;

        if device_id == kAudioObjectUnknown {
            return Ok(None);
        }

        read_cf_string(device_id, kAudioDevicePropertyDeviceUID).map(Some)
    }

    fn set_default_device(&self, direction: Direction, uid: &str) -> Result<()> {
        let device_id = self
            .find_device_id(uid)?
            .with_context(|| format!("{} device '{}' not found", direction, uid))?;

        if !has_streams(device_id, direction) {
            return Err(anyhow::anyhow!("Device '{}' has no {} streams", uid, direction.as_str()));
        }

        let address = property_address(default_selector(direction), kAudioObjectPropertyScopeGlobal);
        let status = unsafe {
            AudioObjectSetPropertyData(
                kAudioObjectSystemObject,
                &address,
                0,
                ptr::null(),
                std::mem::size_of::<AudioDeviceID>() as u32,
                &device_id as *const _ as *const c_void,
            )
        };
        check(status, "set default device")?;

        info!("Set default {} device to {} (ID: {})", direction, uid, device_id);
        Ok(())
    }

    fn add_device_change_listener(&self, callback: Box<dyn Fn() + Send + Sync>) -> Result<()> {
        self.callbacks
            .lock()
            .map_err(|_| anyhow::anyhow!("Listener registry poisoned"))?
            .push(callback);

        let mut listening = self
            .listening
            .lock()
            .map_err(|_| anyhow::anyhow!("Listener state poisoned"))?;
        if *listening {
            return Ok(());
        }

        let address = property_address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal);
        let status = unsafe {
            AudioObjectAddPropertyListener(
                kAudioObjectSystemObject,
                &address,
                Some(device_list_listener),
                self.listener_data(),
            )
        };
        check(status, "register device list listener")?;

        *listening = true;
        info!("CoreAudio device list listener registered");
        Ok(())
    }
}

impl Drop for CoreAudioSystem {
    fn drop(&mut self) {
        let listening = self.listening.lock().map(|l| *l).unwrap_or(false);
        if !listening {
            return;
        }

        let address = property_address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal);
        let status = unsafe {
            AudioObjectRemovePropertyListener(
                kAudioObjectSystemObject,
                &address,
                Some(device_list_listener),
                self.listener_data(),
            )
        };
        if let Err(e) = check(status, "remove device list listener") {
            warn!("{:#}", e);
        }
    }
}

unsafe extern "C" fn device_list_listener(
    _in_object_id: AudioObjectID,
    _in_number_addresses: UInt32,
    _in_addresses: *const AudioObjectPropertyAddress,
    in_client_data: *mut c_void,
) -> OSStatus {
    if !in_client_data.is_null() {
        // Points at the Callbacks owned by a live CoreAudioSystem; Drop
        // unregisters before the Arc is released
        let callbacks = unsafe { &*(in_client_data as *const Callbacks) };
        match callbacks.lock() {
            Ok(callbacks) => callbacks.iter().for_each(|callback| callback()),
            Err(_) => error!("Device change callbacks poisoned"),
        }
    }
    kAudioHardwareNoError as i32
}

fn property_address(selector: u32, scope: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMain,
    }
}

fn default_selector(direction: Direction) -> u32 {
    match direction {
        Direction::Input => kAudioHardwarePropertyDefaultInputDevice,
        Direction::Output => kAudioHardwarePropertyDefaultOutputDevice,
    }
}

fn check(status: OSStatus, what: &str) -> Result<()> {
    if status == kAudioHardwareNoError as i32 {
        Ok(())
    } else {
        Err(anyhow::anyhow!("CoreAudio failed to {}: OSStatus {}", what, status))
    }
}

fn device_ids() -> Result<Vec<AudioDeviceID>> {
    let address = property_address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal);
    let mut size: u32 = 0;

    let status = unsafe {
        AudioObjectGetPropertyDataSize(kAudioObjectSystemObject, &address, 0, ptr::null(), &mut size)
    };
    check(status, "get device list size")?;

    let count = size as usize / std::mem::size_of::<AudioDeviceID>();
    let mut devices: Vec<AudioDeviceID> = vec![0; count];

    let status = unsafe {
        AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &address,
            0,
            ptr::null(),
            &mut size,
            devices.as_mut_ptr() as *mut c_void,
        )
    };
    check(status, "get device list")?;

    // The list may have shrunk between the two calls
    devices.truncate(size as usize / std::mem::size_of::<AudioDeviceID>());
    Ok(devices)
}

fn read_cf_string(device_id: AudioDeviceID, selector: u32) -> Result<String> {
    let address = property_address(selector, kAudioObjectPropertyScopeGlobal);
    let mut size = std::mem::size_of::<CFStringRef>() as u32;
    let mut cf_string: CFStringRef = ptr::null();

    let status = unsafe {
        AudioObjectGetPropertyData(
            device_id,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut cf_string as *mut _ as *mut c_void,
        )
    };
    check(status, "read device string property")?;

    if cf_string.is_null() {
        return Err(anyhow::anyhow!("Device {} returned a null string", device_id));
    }

    // The HAL hands out a retained string
    let cf_string = unsafe { CFString::wrap_under_create_rule(cf_string) };
    Ok(cf_string.to_string())
}

fn has_streams(device_id: AudioDeviceID, direction: Direction) -> bool {
    let scope = match direction {
        Direction::Input => kAudioObjectPropertyScopeInput,
        Direction::Output => kAudioObjectPropertyScopeOutput,
    };
    let address = property_address(kAudioDevicePropertyStreams, scope);
    let mut size: u32 = 0;

    let status = unsafe {
        AudioObjectGetPropertyDataSize(device_id, &address, 0, ptr::null(), &mut size)
    };

    status == kAudioHardwareNoError as i32 && size > 0
}
