#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// Scales every channel by `brightness / 255`, the way strip drivers apply
    /// their global brightness register.
    pub fn with_brightness(self, brightness: u8) -> Rgb {
        let scale = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }
}
