use super::*;

impl ReliveApp {
    /// Translates this frame's egui input into interpreter events.
    pub(crate) fn handle_input(&mut self, ctx: &egui::Context) {
        let (events, scroll, ctrl_held) =
            ctx.input(|i| (i.events.clone(), i.scroll_delta.y, i.modifiers.ctrl));

        // Ctrl arrives as modifier state; the interpreter wants transitions.
        if ctrl_held != self.ctrl_held {
            self.ctrl_held = ctrl_held;
            self.machine.system.event.inject(Event::Key {
                code: KeyCode::LeftCtrl,
                pressed: ctrl_held,
            });
        }

        if scroll > 0.0 {
            self.machine.system.event.inject(Event::MouseButton {
                button: MouseButton::WheelUp,
                pressed: true,
            });
        } else if scroll < 0.0 {
            self.machine.system.event.inject(Event::MouseButton {
                button: MouseButton::WheelDown,
                pressed: true,
            });
        }

        for event in events {
            match event {
                egui::Event::PointerMoved(position) => {
                    self.machine.system.event.inject(Event::MouseMotion(Point::new(
                        position.x as i32,
                        position.y as i32,
                    )));
                }
                egui::Event::PointerButton {
                    pos,
                    button,
                    pressed,
                    ..
                } => {
                    self.machine.system.event.inject(Event::MouseMotion(Point::new(
                        pos.x as i32,
                        pos.y as i32,
                    )));
                    let mapped = match button {
                        egui::PointerButton::Primary => Some(MouseButton::Left),
                        egui::PointerButton::Secondary => Some(MouseButton::Right),
                        _ => None,
                    };
                    if let Some(mapped) = mapped {
                        self.machine.system.event.inject(Event::MouseButton {
                            button: mapped,
                            pressed,
                        });
                    }
                }
                egui::Event::Key { key, pressed, .. } => {
                    let mapped = match key {
                        egui::Key::Space => Some(KeyCode::Space),
                        egui::Key::Enter => Some(KeyCode::Return),
                        egui::Key::ArrowUp => Some(KeyCode::Up),
                        egui::Key::ArrowDown => Some(KeyCode::Down),
                        _ => None,
                    };
                    if let Some(code) = mapped {
                        self.machine
                            .system
                            .event
                            .inject(Event::Key { code, pressed });
                    }
                }
                _ => {}
            }
        }
    }

    /// Uploads the composited frame as a texture and paints it.
    pub(crate) fn render_screen(&mut self, ctx: &egui::Context) {
        let surface = self.machine.system.graphics.screen();
        let size = [surface.width() as usize, surface.height() as usize];
        let image = egui::ColorImage::from_rgba_unmultiplied(size, surface.raw_rgba());
        let texture = match &mut self.screen_texture {
            Some(texture) => {
                texture.set(image, egui::TextureOptions::NEAREST);
                texture.clone()
            }
            None => {
                let texture = ctx.load_texture("screen", image, egui::TextureOptions::NEAREST);
                self.screen_texture = Some(texture.clone());
                texture
            }
        };

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.image(texture.id(), Vec2::new(size[0] as f32, size[1] as f32));
                });
            });
    }

    /// The fatal-error overlay: show the message, wait for input, then quit.
    pub(crate) fn render_error_modal(&mut self, ctx: &egui::Context) {
        let Some(error) = self.machine.last_error().cloned() else {
            return;
        };
        let modal = Modal::new(ctx, "fatal_error_modal");
        modal.show(|ui| {
            modal.title(ui, TITLE_FATAL_ERROR_WINDOW);
            modal.frame(ui, |ui| {
                ui.label(RichText::new(error.to_string()).monospace());
            });
            modal.buttons(ui, |ui| {
                if modal.button(ui, CAPTION_BUTTON_QUIT).clicked() {
                    self.quit_requested = true;
                }
            });
        });
        modal.open();
    }
}
