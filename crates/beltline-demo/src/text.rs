//! Plain-text renderer. Each draw pass builds one text frame; the most
//! recent finished frame is kept in a shared buffer for the host to print.

use beltline_core::device::{Connection, Device};
use beltline_core::render::{RenderError, RenderSurface, Renderer};
use beltline_core::sim::{SimulationConfig, SimulationStatus};
use beltline_core::token::Token;
use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

pub struct TextRenderer {
    config: SimulationConfig,
    frame: String,
    latest: Rc<RefCell<String>>,
}

impl Renderer for TextRenderer {
    fn clear(&mut self) {
        self.frame.clear();
    }

    fn render_devices(&mut self, devices: &[Device]) {
        for d in devices {
            let _ = write!(
                self.frame,
                "  {:<12} {:<9} {:<8} {}",
                d.id,
                format!("{:?}", d.device_type()).to_lowercase(),
                d.state,
                self.config.device_color(d),
            );
            if let Some(reason) = &d.fault_reason {
                let _ = write!(self.frame, "  ({reason})");
            }
            self.frame.push('\n');
        }
    }

    fn render_connections(&mut self, _devices: &[Device], connections: &[Connection]) {
        let links: Vec<String> = connections
            .iter()
            .map(|c| format!("{}->{}", c.from_device_id, c.to_device_id))
            .collect();
        let _ = writeln!(self.frame, "  links: {}", links.join(" "));
    }

    fn render_tokens(&mut self, tokens: &[Token]) {
        let _ = write!(self.frame, "  tokens ({}):", tokens.len());
        for t in tokens {
            let _ = write!(
                self.frame,
                " {}@{}:{:.0}%",
                t.id,
                t.current_device_id,
                t.progress * 100.0
            );
        }
        self.frame.push('\n');
    }

    fn render_status(&mut self, status: SimulationStatus, x: f64, y: f64) {
        let _ = writeln!(self.frame, "  [{status}] at ({x}, {y})");
        *self.latest.borrow_mut() = std::mem::take(&mut self.frame);
    }
}

/// Hands out text renderers that publish into one shared buffer.
pub struct TextSurface {
    config: SimulationConfig,
    latest: Rc<RefCell<String>>,
}

impl TextSurface {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            latest: Rc::default(),
        }
    }

    /// The most recently completed frame.
    pub fn latest_frame(&self) -> String {
        self.latest.borrow().clone()
    }
}

impl RenderSurface for TextSurface {
    fn acquire_renderer(&mut self) -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(TextRenderer {
            config: self.config.clone(),
            frame: String::new(),
            latest: Rc::clone(&self.latest),
        }))
    }
}
