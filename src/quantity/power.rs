quantity!(Watts, "W", 0);

impl Watts {
    #[must_use]
    pub const fn to_kilowatts(self) -> f64 {
        self.0 / 1000.0
    }
}
