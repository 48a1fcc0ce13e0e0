#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::Delay;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::AnyPin;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

use brewnode_core::sensors::Mpu6050;
use brewnode_core::{CycleInputs, ReportStatus, enter_sleep, run_cycle};
use brewnode_firmware::config::NODE_CONFIG;
use brewnode_firmware::net::EmbassyTransport;
use brewnode_firmware::power::DeepSleep;
use brewnode_firmware::wifi;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("PANIC: {}", info);
    // A panic on every boot must still end each wake in deep sleep
    // SAFETY: nothing runs after this point
    let mut sleeper = unsafe { DeepSleep::steal() };
    sleep_forever(&mut sleeper, NODE_CONFIG.effective_sleep_duration_us())
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "socket buffers live in the transport on main's stack"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let node = &NODE_CONFIG;
    let mut sleeper = DeepSleep::new(peripherals.LPWR);
    info!(
        "brewnode sensor {} waking, reporting to {}:{}",
        node.identity.sensor_id, node.collector.host, node.collector.port
    );

    // Pins are chosen at build time.
    // SAFETY: the configured pins are used for nothing else
    let sda = unsafe { AnyPin::steal(node.accel.sda_pin) };
    let scl = unsafe { AnyPin::steal(node.accel.scl_pin) };

    let i2c = match I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(node.accel.frequency_khz)),
    ) {
        Ok(i2c) => i2c.with_sda(sda).with_scl(scl).into_async(),
        Err(e) => {
            error!("I2C configuration rejected: {:?}", e);
            sleep_forever(&mut sleeper, node.effective_sleep_duration_us())
        }
    };
    let mut sensor = Mpu6050::new(i2c, Delay, node.accel.address, node.accel.bus_timeout_ms);

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    let link = match wifi::join(spawner, peripherals.WIFI, &node.network, seed).await {
        Ok(link) => Some(link),
        Err(e) => {
            error!("Network unavailable this cycle: {}", e);
            None
        }
    };

    let mut transport = EmbassyTransport::new(
        link.as_ref().map(|link| link.stack),
        &node.retry,
    );

    let outcome = run_cycle(
        node,
        &mut sensor,
        &mut transport,
        &mut Delay,
        CycleInputs::default(),
    )
    .await;

    if let ReportStatus::Delivered(ack) = outcome.report {
        info!("Report delivered (HTTP {})", ack.status);
    }

    enter_sleep(&outcome, &mut sleeper);
    sleep_forever(&mut sleeper, outcome.sleep_duration_us)
}

/// Sleep until the wake-up reset.
fn sleep_forever(sleeper: &mut DeepSleep<'_>, duration_us: u64) -> ! {
    use brewnode_core::SleepControl;

    loop {
        sleeper.sleep_for(duration_us);
    }
}
