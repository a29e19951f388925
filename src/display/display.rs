//! SDL2 Window Display Module
//! Shows the composited camera grid in an SDL2 window.
//! Uses the sdl2 crate for window management and rendering.

use color_eyre::{eyre::eyre, Result};
use image::RgbImage;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use tracing::info;

use super::Renderer;

/// SDL2 Window Display
/// Owns the SDL context, the window canvas and the event pump.
/// `q`, Escape or closing the window requests quit.
pub struct Sdl2Display {
    _context: sdl2::Sdl,
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
}

impl Sdl2Display {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let context = sdl2::init().map_err(|e| eyre!(e))?;
        let video_subsystem = context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window(title, width, height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();
        let event_pump = context.event_pump().map_err(|e| eyre!(e))?;

        info!("SDL2 window opened ({}x{})", width, height);
        Ok(Self {
            _context: context,
            canvas,
            texture_creator,
            event_pump,
        })
    }

    fn quit_requested(&mut self) -> bool {
        let mut quit = false;
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    info!("Quit event received");
                    quit = true;
                }
                Event::KeyDown {
                    keycode: Some(key), ..
                } if key == Keycode::Q || key == Keycode::Escape => {
                    info!("Quit key pressed");
                    quit = true;
                }
                _ => {}
            }
        }
        quit
    }
}

impl Renderer for Sdl2Display {
    fn show(&mut self, composite: &RgbImage) -> Result<bool> {
        let (width, height) = composite.dimensions();
        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, composite.as_raw(), (width * 3) as usize)
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();
        Ok(self.quit_requested())
    }

    fn idle(&mut self) -> Result<bool> {
        Ok(self.quit_requested())
    }
}
