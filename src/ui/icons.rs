//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Deployment indicators
pub static SEND: Emoji<'_, '_> = Emoji("📤 ", "[TX]");
pub static BLOCK: Emoji<'_, '_> = Emoji("🧱 ", "[B]");
pub static DAO: Emoji<'_, '_> = Emoji("🏛️  ", "[DAO]");
pub static COINS: Emoji<'_, '_> = Emoji("🪙 ", "[$]");
