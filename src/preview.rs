//! Live display for the snapshot loop.
//!
//! The snapshot loop hands every frame to a `Preview` and stops when it answers
//! `PreviewAction::Quit`. Without the `preview-window` feature only the
//! headless preview exists and the loop is stopped with Ctrl-C.

use anyhow::Result;

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewAction {
    Continue,
    Quit,
}

pub trait Preview {
    /// Display `frame` and report whether the user asked to quit.
    fn show(&mut self, frame: &Frame) -> Result<PreviewAction>;
}

/// Displays nothing, never quits.
#[derive(Debug, Default)]
pub struct HeadlessPreview;

impl Preview for HeadlessPreview {
    fn show(&mut self, _frame: &Frame) -> Result<PreviewAction> {
        Ok(PreviewAction::Continue)
    }
}

/// Pack RGB24 into the `0x00RRGGBB` words a framebuffer window expects.
pub fn rgb_to_u32(pixels: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        pixels
            .chunks_exact(3)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32),
    );
}

#[cfg(feature = "preview-window")]
pub use window::WindowPreview;

#[cfg(feature = "preview-window")]
mod window {
    use anyhow::{anyhow, Result};
    use minifb::{Key, Window, WindowOptions};

    use super::{rgb_to_u32, Preview, PreviewAction};
    use crate::frame::Frame;

    /// A native window; `q`, `Esc` or closing the window quits.
    pub struct WindowPreview {
        title: String,
        window: Option<Window>,
        size: (usize, usize),
        buffer: Vec<u32>,
    }

    impl WindowPreview {
        pub fn new(title: &str) -> Self {
            Self {
                title: title.to_string(),
                window: None,
                size: (0, 0),
                buffer: Vec::new(),
            }
        }

        // minifb cannot resize a window's framebuffer, so a size change reopens it.
        fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window> {
            if self.window.is_none() || self.size != (width, height) {
                let window = Window::new(&self.title, width, height, WindowOptions::default())
                    .map_err(|e| anyhow!("open preview window: {}", e))?;
                self.window = Some(window);
                self.size = (width, height);
            }
            self.window
                .as_mut()
                .ok_or_else(|| anyhow!("preview window unavailable"))
        }
    }

    impl Preview for WindowPreview {
        fn show(&mut self, frame: &Frame) -> Result<PreviewAction> {
            let (width, height) = (frame.width as usize, frame.height as usize);
            let mut buffer = std::mem::take(&mut self.buffer);
            rgb_to_u32(frame.pixels(), &mut buffer);

            let window = self.window_for(width, height)?;
            let result = window.update_with_buffer(&buffer, width, height);
            let quit = !window.is_open()
                || window.is_key_down(Key::Q)
                || window.is_key_down(Key::Escape);
            self.buffer = buffer;

            result.map_err(|e| anyhow!("update preview window: {}", e))?;
            Ok(if quit {
                PreviewAction::Quit
            } else {
                PreviewAction::Continue
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_rgb_into_words() {
        let mut out = Vec::new();
        rgb_to_u32(&[0x12, 0x34, 0x56, 0xff, 0x00, 0x01], &mut out);
        assert_eq!(out, vec![0x0012_3456, 0x00ff_0001]);
    }

    #[test]
    fn headless_never_quits() -> Result<()> {
        let frame = Frame::new(vec![0u8; 12], 2, 2)?;
        assert_eq!(HeadlessPreview.show(&frame)?, PreviewAction::Continue);
        Ok(())
    }
}
