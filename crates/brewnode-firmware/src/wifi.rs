//! Wi-Fi association and network bring-up.
//!
//! The node joins as a station, starts the `embassy-net` stack with DHCP
//! and waits for an address. The whole join is bounded by the configured
//! join timeout; past it the cycle runs offline.

use brewnode_core::config::NetworkConfig;
use brewnode_core::timeout::{Elapsed, with_timeout};
use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::Delay;
use esp_hal::peripherals::WIFI;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};
use log::{info, warn};
use static_cell::StaticCell;

use crate::FirmwareError;

/// DHCP, DNS and one TCP socket.
const SOCKET_COUNT: usize = 3;

/// A joined network. The controller must stay alive while the stack is used.
pub struct Link {
    pub stack: Stack<'static>,
    _controller: WifiController<'static>,
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

pub async fn join(
    spawner: Spawner,
    wifi: WIFI<'static>,
    network: &NetworkConfig<'_>,
    seed: u64,
) -> Result<Link, FirmwareError> {
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static RESOURCES: StaticCell<StackResources<SOCKET_COUNT>> = StaticCell::new();

    let radio = RADIO.init(esp_radio::init().map_err(|_| FirmwareError::RadioInit)?);
    let (mut controller, interfaces) =
        esp_radio::wifi::new(radio, wifi, Default::default()).map_err(|_| FirmwareError::RadioInit)?;

    let client = ClientConfig::default()
        .with_ssid(network.ssid.into())
        .with_password(network.password.into());
    controller.set_config(&ModeConfig::Client(client))?;
    controller.start_async().await?;

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner).map_err(|_| FirmwareError::Spawn)?);

    info!("Joining Wi-Fi network {:?}", network.ssid);
    let joined = with_timeout(&mut Delay, network.join_timeout_ms, async {
        controller.connect_async().await?;
        stack.wait_config_up().await;
        Ok::<(), FirmwareError>(())
    })
    .await;

    match joined {
        Ok(Ok(())) => {
            if let Some(config) = stack.config_v4() {
                info!("Network up, address {}", config.address);
            }
            Ok(Link {
                stack,
                _controller: controller,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(Elapsed) => {
            warn!("No network after {} ms", network.join_timeout_ms);
            Err(FirmwareError::JoinTimeout(network.join_timeout_ms))
        }
    }
}
