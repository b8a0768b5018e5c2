//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements       | Connects to                    |
//! |----------------|------------------|--------------------------------|
//! | `battery`      | BatteryPort      | ESP32 ADC1, sensor rail GPIO   |
//! | `fs_store`     | StoragePort      | FAT flash partition / host dir |
//! | `module_store` | UpdateSource     | Module tree + HTTPS file host  |
//! | `system`       | BoardPort        | Reset, USB, sleep, indicators  |
//! | `wifi`         | NetworkPort      | ESP-IDF WiFi STA               |

pub mod battery;
pub mod fs_store;
pub mod module_store;
pub mod system;
pub mod wifi;
