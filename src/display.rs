/// Externally rendered, selectable device list. The monitor is the only
/// writer and only ever performs two operations on it: clearing every
/// entry except the fixed placeholder, and appending an option.
pub trait DeviceDisplay {
    fn clear_devices(&mut self);
    fn append_device(&mut self, id: &str, label: &str, selected: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOption {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

/// Buffered implementation backing the CLI. Rendering is up to the
/// caller; this only tracks the placeholder and the current options.
pub struct DeviceList {
    placeholder: String,
    options: Vec<DeviceOption>,
}

impl DeviceList {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            options: vec![],
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn options(&self) -> &[DeviceOption] {
        self.options.as_slice()
    }

    pub fn selected(&self) -> Option<&DeviceOption> {
        self.options.iter().find(|option| option.selected)
    }
}

impl DeviceDisplay for DeviceList {
    fn clear_devices(&mut self) {
        self.options.clear();
    }

    fn append_device(&mut self, id: &str, label: &str, selected: bool) {
        self.options.push(DeviceOption {
            id: id.to_owned(),
            label: label.to_owned(),
            selected,
        });
    }
}
