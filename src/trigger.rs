/// Hardware access needed to decide, once per boot, whether the loader
/// or the application runs.
///
/// Implementation reads a reserved RAM word, the first bytes of the
/// application section and the button pins. None of these functions are
/// called again once the loader is running.
pub trait BootEnvironment {
    /// Value an application writes to the reserved RAM word before it
    /// resets into the loader.
    const ENTRY_MAGIC: u32 = 0xB007_10AD;

    /// Read the reserved RAM word.
    fn read_magic(&mut self) -> u32;

    /// Overwrite the reserved RAM word so it does not trigger again.
    fn clear_magic(&mut self);

    /// First four bytes of the application section. An erased
    /// application reads as all `0xFF`.
    fn read_reset_vector(&mut self) -> [u8; 4];

    /// Configure button pins as inputs with pull-ups.
    fn configure_buttons(&mut self);

    /// `true` if the button combination that requests the loader is held.
    fn buttons_held(&mut self) -> bool;

    /// Return button pins to their reset configuration.
    fn restore_buttons(&mut self);

    /// Move interrupt vectors to the application section and jump to its
    /// reset vector.
    ///
    /// # Safety
    ///
    /// Must be called with peripherals in their reset state. Control never
    /// returns to the loader.
    unsafe fn jump_to_application(&mut self) -> !;
}

/// Why the loader was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryReason {
    /// Application left [`BootEnvironment::ENTRY_MAGIC`] in RAM.
    MagicSignature,
    /// Application section is erased.
    BlankApplication,
    /// Button combination was held at power-on.
    ButtonsHeld,
}

/// Outcome of the boot check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision<T> {
    /// Start the installed application.
    RunApplication,
    /// Stay in the loader.
    EnterLoader(T),
}

impl<T> Decision<T> {
    /// Maps the loader entry value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Decision<U> {
        match self {
            Decision::RunApplication => Decision::RunApplication,
            Decision::EnterLoader(v) => Decision::EnterLoader(f(v)),
        }
    }
}

// Pins are restored on every return path.
struct Buttons<'e, E: BootEnvironment> {
    env: &'e mut E,
}

impl<'e, E: BootEnvironment> Buttons<'e, E> {
    fn configure(env: &'e mut E) -> Self {
        env.configure_buttons();
        Self { env }
    }

    fn held(&mut self) -> bool {
        self.env.buttons_held()
    }
}

impl<E: BootEnvironment> Drop for Buttons<'_, E> {
    fn drop(&mut self) {
        self.env.restore_buttons();
    }
}

/// Check loader entry conditions: magic word, blank application, buttons,
/// in this order.
///
/// Magic word is cleared when it is seen. On the application path the
/// only side effect is reconfiguring and restoring the button pins.
pub fn evaluate<E: BootEnvironment>(env: &mut E) -> Decision<EntryReason> {
    if env.read_magic() == E::ENTRY_MAGIC {
        env.clear_magic();
        return Decision::EnterLoader(EntryReason::MagicSignature);
    }

    if env.read_reset_vector() == [0xff; 4] {
        return Decision::EnterLoader(EntryReason::BlankApplication);
    }

    let held = Buttons::configure(env).held();
    if held {
        Decision::EnterLoader(EntryReason::ButtonsHeld)
    } else {
        Decision::RunApplication
    }
}

/// Run the boot check and jump to the application if no entry condition
/// is present. Returns only when the loader should run.
///
/// # Safety
///
/// Same as [`BootEnvironment::jump_to_application()`]: call it first
/// thing after reset.
pub unsafe fn boot<E: BootEnvironment>(env: &mut E) -> EntryReason {
    match evaluate(env) {
        Decision::RunApplication => {
            log::info!("starting application");
            env.jump_to_application()
        }
        Decision::EnterLoader(reason) => {
            log::info!("entering loader: {:?}", reason);
            reason
        }
    }
}
