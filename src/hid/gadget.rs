//! Linux USB gadget keyboard device.
//!
//! The emulation channel is a `/dev/hidgN` character device exposed by the
//! kernel's HID gadget function. Input reports written to it reach the host
//! as key events; LED output reports sent back by the host are read from the
//! same node. If no node is present, a gadget is registered through configfs
//! and torn down again when the handle is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Error, ErrorKind, Read, Write};
use std::os::unix::fs::symlink;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::{KeyboardDevice, KeyboardReport, LockKey, KEYBOARD_REPORT_DESCRIPTOR};

const CONFIGFS_GADGET_ROOT: &str = "/sys/kernel/config/usb_gadget";
const UDC_CLASS_DIR: &str = "/sys/class/udc";
const HIDG_NODE_PREFIX: &str = "hidg";

// Linux Foundation vendor ID with the composite-gadget product ID, as used
// by the stock HID gadget examples.
const GADGET_VENDOR_ID: &str = "0x1d6b";
const GADGET_PRODUCT_ID: &str = "0x0104";

lazy_static::lazy_static! {
    static ref GADGET_NODES: Mutex<Option<Vec<PathBuf>>> = Mutex::new(None);
}

/// Scan `/dev` for HID gadget nodes, caching the result process-wide.
fn discover_nodes() -> io::Result<Vec<PathBuf>> {
    let mut cache = GADGET_NODES.lock().unwrap();
    if let Some(ref nodes) = *cache {
        return Ok(nodes.clone());
    }
    let nodes = scan_nodes()?;
    *cache = Some(nodes.clone());
    Ok(nodes)
}

fn scan_nodes() -> io::Result<Vec<PathBuf>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir("/dev")? {
        let entry = entry?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(HIDG_NODE_PREFIX)
        {
            nodes.push(entry.path());
        }
    }
    nodes.sort();
    Ok(nodes)
}

fn first_udc() -> io::Result<String> {
    let mut names: Vec<String> = fs::read_dir(UDC_CLASS_DIR)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
        .into_iter()
        .next()
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "no USB device controller available"))
}

/// A gadget registered by this process through configfs.
///
/// Dropping the registration unbinds the UDC and removes the configfs tree
/// in the reverse order of creation.
pub struct GadgetRegistration {
    root: PathBuf,
    bound: bool,
}

impl GadgetRegistration {
    pub fn register(name: &str) -> io::Result<Self> {
        let mut registration = Self {
            root: Path::new(CONFIGFS_GADGET_ROOT).join(name),
            bound: false,
        };
        // A partially built tree is torn down by Drop when populate fails.
        registration.populate()?;
        Ok(registration)
    }

    fn populate(&mut self) -> io::Result<()> {
        let root = &self.root;

        fs::create_dir_all(root.join("strings/0x409"))?;
        fs::write(root.join("idVendor"), GADGET_VENDOR_ID)?;
        fs::write(root.join("idProduct"), GADGET_PRODUCT_ID)?;
        fs::write(root.join("bcdDevice"), "0x0100")?;
        fs::write(root.join("bcdUSB"), "0x0200")?;
        fs::write(root.join("strings/0x409/manufacturer"), "hid_latency_benchmark")?;
        fs::write(root.join("strings/0x409/product"), "Latency Benchmark Keyboard")?;
        fs::write(root.join("strings/0x409/serialnumber"), "0000000000000001")?;

        fs::create_dir_all(root.join("configs/c.1/strings/0x409"))?;
        fs::write(
            root.join("configs/c.1/strings/0x409/configuration"),
            "Boot keyboard",
        )?;
        fs::write(root.join("configs/c.1/MaxPower"), "250")?;

        // Boot interface subclass 1, keyboard protocol 1.
        fs::create_dir_all(root.join("functions/hid.usb0"))?;
        fs::write(root.join("functions/hid.usb0/protocol"), "1")?;
        fs::write(root.join("functions/hid.usb0/subclass"), "1")?;
        fs::write(root.join("functions/hid.usb0/report_length"), "8")?;
        fs::write(
            root.join("functions/hid.usb0/report_desc"),
            KEYBOARD_REPORT_DESCRIPTOR,
        )?;

        symlink(
            root.join("functions/hid.usb0"),
            root.join("configs/c.1/hid.usb0"),
        )?;

        let udc = first_udc()?;
        fs::write(root.join("UDC"), &udc)?;
        self.bound = true;
        println!("▸ Registered USB gadget on controller {}", udc);
        Ok(())
    }
}

impl Drop for GadgetRegistration {
    fn drop(&mut self) {
        if self.bound {
            let _ = fs::write(self.root.join("UDC"), "");
        }
        let _ = fs::remove_file(self.root.join("configs/c.1/hid.usb0"));
        let _ = fs::remove_dir(self.root.join("configs/c.1/strings/0x409"));
        let _ = fs::remove_dir(self.root.join("configs/c.1"));
        let _ = fs::remove_dir(self.root.join("functions/hid.usb0"));
        let _ = fs::remove_dir(self.root.join("strings/0x409"));
        let _ = fs::remove_dir(&self.root);
    }
}

fn wait_for_new_node(before: &[PathBuf]) -> io::Result<PathBuf> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(node) = scan_nodes()?
            .into_iter()
            .find(|node| !before.contains(node))
        {
            return Ok(node);
        }
        if Instant::now() >= deadline {
            return Err(Error::new(
                ErrorKind::NotFound,
                "gadget bound but no /dev/hidg node appeared",
            ));
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn set_nonblocking(device: &File) -> io::Result<()> {
    let fd = device.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Keyboard emulation over a HID gadget character device.
pub struct GadgetKeyboard {
    device: File,
    report: KeyboardReport,
    leds: u8,
    _registration: Option<GadgetRegistration>,
}

impl GadgetKeyboard {
    /// Acquire an emulation channel: a configured path, an existing
    /// `/dev/hidg` node, or a freshly registered gadget, in that order.
    pub fn acquire(device_path: Option<&Path>) -> io::Result<Self> {
        if let Some(path) = device_path {
            println!("▸ Using configured device: {}", path.display());
            return Self::open(path, None);
        }
        if let Some(node) = discover_nodes()?.first() {
            println!("▸ Found HID gadget device: {}", node.display());
            return Self::open(node, None);
        }
        println!("▸ No /dev/{}* node present, registering a gadget", HIDG_NODE_PREFIX);
        let before = scan_nodes()?;
        let registration =
            GadgetRegistration::register(&format!("hidlat-{}", std::process::id()))?;
        let node = wait_for_new_node(&before)?;
        println!("▸ Gadget device ready: {}", node.display());
        Self::open(&node, Some(registration))
    }

    fn open(path: &Path, registration: Option<GadgetRegistration>) -> io::Result<Self> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;
        set_nonblocking(&device)?;
        Ok(Self {
            device,
            report: KeyboardReport::default(),
            leds: 0,
            _registration: registration,
        })
    }

    fn write_report(&mut self) -> io::Result<()> {
        self.device.write_all(&self.report.encode())
    }

    /// Consume any LED output reports the host has queued, keeping the
    /// latest one. Never blocks.
    fn drain_led_reports(&mut self) -> io::Result<()> {
        let mut buf = [0u8; super::KEYBOARD_REPORT_SIZE];
        loop {
            match self.device.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => self.leds = buf[0],
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl KeyboardDevice for GadgetKeyboard {
    fn press(&mut self, key: LockKey) -> io::Result<()> {
        if !self.report.press(key.keycode()) {
            return Err(Error::new(
                ErrorKind::Other,
                "keyboard report slots exhausted",
            ));
        }
        self.write_report()
    }

    fn release(&mut self, key: LockKey) -> io::Result<()> {
        self.report.release(key.keycode());
        self.write_report()
    }

    fn led_on(&mut self, key: LockKey) -> io::Result<bool> {
        self.drain_led_reports()?;
        Ok(self.leds & key.led_mask() != 0)
    }
}
